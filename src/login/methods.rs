//! Second-factor method dispatch.
//!
//! Each enabled method validates a submitted candidate against the user's
//! stored material. Validation returning `Ok(false)` is a normal wrong-code
//! outcome; errors are reserved for store faults and missing provisioning.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::AuthCore;
use crate::error::{AuthError, AuthResult};
use crate::otp::{is_valid_authcode_at, Secret};
use crate::store::MethodId;

#[async_trait]
pub trait SecondFactor: Send + Sync {
    fn id(&self) -> MethodId;

    /// Check the candidate for this user. Single-use material (email codes,
    /// backup codes, TOTP steps) is burned by a successful check.
    async fn validate(
        &self,
        core: &AuthCore,
        user: Uuid,
        candidate: &str,
        now: i64,
    ) -> AuthResult<bool>;
}

/// Static registry; methods carry no state of their own.
#[must_use]
pub fn resolve(method: MethodId) -> &'static dyn SecondFactor {
    match method {
        MethodId::Totp => &TotpMethod,
        MethodId::Email => &EmailMethod,
        MethodId::BackupCodes => &BackupMethod,
    }
}

pub struct TotpMethod;

#[async_trait]
impl SecondFactor for TotpMethod {
    fn id(&self) -> MethodId {
        MethodId::Totp
    }

    async fn validate(
        &self,
        core: &AuthCore,
        user: Uuid,
        candidate: &str,
        now: i64,
    ) -> AuthResult<bool> {
        let state = core.store.load(user).await?;
        let Some(encoded) = state.totp_secret else {
            return Err(AuthError::MethodNotEnabled);
        };
        let secret = Secret::from_base32(&encoded)?;
        match is_valid_authcode_at(&secret, candidate, now, &core.totp)? {
            // A matched step counts only if it advances past the last
            // accepted one; an equal or older step is a replay.
            Some(step) => core.store.commit_totp_step(user, step).await,
            None => Ok(false),
        }
    }
}

pub struct EmailMethod;

#[async_trait]
impl SecondFactor for EmailMethod {
    fn id(&self) -> MethodId {
        MethodId::Email
    }

    async fn validate(
        &self,
        core: &AuthCore,
        user: Uuid,
        candidate: &str,
        now: i64,
    ) -> AuthResult<bool> {
        let digest = Sha256::digest(candidate.trim().as_bytes()).to_vec();
        core.store.consume_email_code(user, &digest, now).await
    }
}

pub struct BackupMethod;

#[async_trait]
impl SecondFactor for BackupMethod {
    fn id(&self) -> MethodId {
        MethodId::BackupCodes
    }

    async fn validate(
        &self,
        core: &AuthCore,
        user: Uuid,
        candidate: &str,
        _now: i64,
    ) -> AuthResult<bool> {
        let hasher = &core.hasher;
        let matcher = move |stored: &str| hasher.verify(candidate, stored);
        core.store.consume_backup_code(user, &matcher).await
    }
}
