//! In-memory state store.
//!
//! Each user's record sits behind its own async mutex, making the record
//! the unit of locking: the atomic trait operations hold exactly one user's
//! lock for the duration of their read-verify-mutate step, and no cross-user
//! locking exists.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::backup::GenerateMode;
use crate::error::AuthResult;
use crate::store::{LockOutcome, NonceOutcome, StoredCode, User2faState, UserStateStore};

#[derive(Default)]
pub struct MemoryStateStore {
    users: RwLock<HashMap<Uuid, Arc<Mutex<User2faState>>>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn entry(&self, user: Uuid) -> Arc<Mutex<User2faState>> {
        if let Some(entry) = self.users.read().await.get(&user) {
            return Arc::clone(entry);
        }
        let mut users = self.users.write().await;
        Arc::clone(users.entry(user).or_default())
    }
}

fn digests_match(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

#[async_trait]
impl UserStateStore for MemoryStateStore {
    async fn load(&self, user: Uuid) -> AuthResult<User2faState> {
        let entry = self.entry(user).await;
        let state = entry.lock().await;
        Ok(state.clone())
    }

    async fn save(&self, user: Uuid, state: User2faState) -> AuthResult<()> {
        let entry = self.entry(user).await;
        *entry.lock().await = state;
        Ok(())
    }

    async fn remove(&self, user: Uuid) -> AuthResult<()> {
        self.users.write().await.remove(&user);
        Ok(())
    }

    async fn put_nonce(&self, user: Uuid, record: StoredCode) -> AuthResult<()> {
        let entry = self.entry(user).await;
        entry.lock().await.login_nonce = Some(record);
        Ok(())
    }

    async fn consume_nonce(
        &self,
        user: Uuid,
        digest: &[u8],
        now: i64,
    ) -> AuthResult<NonceOutcome> {
        let entry = self.entry(user).await;
        let mut state = entry.lock().await;
        // take() burns the nonce no matter how the comparison goes.
        let Some(stored) = state.login_nonce.take() else {
            return Ok(NonceOutcome::Missing);
        };
        if stored.expires_at <= now {
            return Ok(NonceOutcome::Expired);
        }
        if digests_match(&stored.digest, digest) {
            Ok(NonceOutcome::Consumed)
        } else {
            Ok(NonceOutcome::Mismatch)
        }
    }

    async fn put_email_code(&self, user: Uuid, record: StoredCode) -> AuthResult<()> {
        let entry = self.entry(user).await;
        entry.lock().await.email_code = Some(record);
        Ok(())
    }

    async fn consume_email_code(&self, user: Uuid, digest: &[u8], now: i64) -> AuthResult<bool> {
        let entry = self.entry(user).await;
        let mut state = entry.lock().await;
        let Some(stored) = state.email_code.clone() else {
            return Ok(false);
        };
        if stored.expires_at <= now {
            state.email_code = None;
            return Ok(false);
        }
        if digests_match(&stored.digest, digest) {
            state.email_code = None;
            return Ok(true);
        }
        // A wrong guess keeps the code; the attempt limiter bounds guessing.
        Ok(false)
    }

    async fn set_backup_codes(
        &self,
        user: Uuid,
        hashes: Vec<String>,
        mode: GenerateMode,
    ) -> AuthResult<usize> {
        let entry = self.entry(user).await;
        let mut state = entry.lock().await;
        match mode {
            GenerateMode::Replace => state.backup_code_hashes = hashes,
            GenerateMode::Append => state.backup_code_hashes.extend(hashes),
        }
        Ok(state.backup_code_hashes.len())
    }

    async fn consume_backup_code(
        &self,
        user: Uuid,
        matcher: &(dyn for<'a> Fn(&'a str) -> bool + Sync),
    ) -> AuthResult<bool> {
        let entry = self.entry(user).await;
        let mut state = entry.lock().await;
        let position = state
            .backup_code_hashes
            .iter()
            .position(|hash| matcher(hash));
        match position {
            Some(index) => {
                state.backup_code_hashes.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_failed_attempt(
        &self,
        user: Uuid,
        expires_at: i64,
        now: i64,
    ) -> AuthResult<u32> {
        let entry = self.entry(user).await;
        let mut state = entry.lock().await;
        let window_expired = state.attempts_expire_at.is_some_and(|at| at <= now);
        if window_expired {
            state.failed_attempts = 0;
        }
        if state.attempts_expire_at.is_none() || window_expired {
            state.attempts_expire_at = Some(expires_at);
        }
        state.failed_attempts = state.failed_attempts.saturating_add(1);
        Ok(state.failed_attempts)
    }

    async fn clear_attempts(&self, user: Uuid) -> AuthResult<()> {
        let entry = self.entry(user).await;
        let mut state = entry.lock().await;
        state.failed_attempts = 0;
        state.attempts_expire_at = None;
        Ok(())
    }

    async fn commit_totp_step(&self, user: Uuid, step: i64) -> AuthResult<bool> {
        let entry = self.entry(user).await;
        let mut state = entry.lock().await;
        if state.last_totp_step.is_some_and(|last| step <= last) {
            return Ok(false);
        }
        state.last_totp_step = Some(step);
        Ok(true)
    }

    async fn lock_once(&self, user: Uuid) -> AuthResult<LockOutcome> {
        let entry = self.entry(user).await;
        let mut state = entry.lock().await;
        let newly_locked = !state.locked;
        state.locked = true;
        let should_notify = !state.lock_notified;
        state.lock_notified = true;
        Ok(LockOutcome {
            newly_locked,
            should_notify,
        })
    }
}
