//! Per-user 2FA state and its storage interface.
//!
//! The original keeps this as string-keyed user meta with implicit defaults;
//! here it is a typed record behind a repository trait. The trait carries
//! dedicated atomic operations for every check-then-act hazard in the login
//! path (nonce consumption, backup-code consumption, attempt counting, TOTP
//! step tracking, the lock transition) so no backend can get them wrong by
//! composing load/save.

pub mod memory;

pub use memory::MemoryStateStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::backup::GenerateMode;
use crate::error::AuthResult;
use crate::policy::EnforcementState;

/// Second-factor method identifiers.
///
/// `BackupCodes` may appear as an enabled method, but backup codes also
/// remain an orthogonal fallback whenever any primary method is active.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum MethodId {
    Totp,
    Email,
    BackupCodes,
}

impl MethodId {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Totp => "totp",
            Self::Email => "email",
            Self::BackupCodes => "backup-codes",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "totp" => Some(Self::Totp),
            "email" => Some(Self::Email),
            "backup-codes" => Some(Self::BackupCodes),
            _ => None,
        }
    }
}

/// Derived, cached configuration status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Undetermined,
    HasEnabledMethods,
    NeedsToConfigure,
}

/// A hashed single-use token with an expiry (login nonce, email code).
/// Only the SHA-256 digest is stored; the raw value goes to the user once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCode {
    pub digest: Vec<u8>,
    pub expires_at: i64,
}

/// The full per-user record. Created lazily with defaults on first access;
/// destroyed only by an explicit remove.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User2faState {
    pub enabled_method: Option<MethodId>,
    pub status: UserStatus,
    pub enforcement: EnforcementState,
    pub grace_expiry: Option<i64>,
    pub instant_enforcement: bool,
    /// Sticky; cleared only by an explicit administrative unlock.
    pub locked: bool,
    /// Guards the at-most-once locked notification.
    pub lock_notified: bool,
    /// Set when a previously enabled method is no longer globally available.
    pub needs_reconfigure: bool,
    /// Grace nag suppressed until the next settings change.
    pub nag_dismissed: bool,
    /// Hash of the policy settings this record was last evaluated against.
    pub settings_hash: Option<String>,
    /// Confirmed TOTP secret, base32.
    pub totp_secret: Option<String>,
    /// Enrollment-in-progress secret, promoted on first verified code.
    pub pending_totp_secret: Option<String>,
    /// Argon2id PHC strings; one entry removed per successful validation.
    pub backup_code_hashes: Vec<String>,
    pub email_code: Option<StoredCode>,
    pub login_nonce: Option<StoredCode>,
    pub failed_attempts: u32,
    pub attempts_expire_at: Option<i64>,
    /// Highest TOTP step accepted so far; replays at or below it are
    /// rejected.
    pub last_totp_step: Option<i64>,
}

impl User2faState {
    /// Recompute the cached status from the method and enforcement fields.
    pub fn recompute_status(&mut self) {
        self.status = if self.enabled_method.is_some() {
            UserStatus::HasEnabledMethods
        } else if self.enforcement == EnforcementState::Enforced {
            UserStatus::NeedsToConfigure
        } else {
            UserStatus::Undetermined
        };
    }
}

/// Result of presenting a challenge nonce. Whatever the outcome, a stored
/// nonce is burned by the attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceOutcome {
    Consumed,
    Mismatch,
    Expired,
    Missing,
}

/// Outcome of the idempotent lock transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockOutcome {
    /// False when the account was already locked.
    pub newly_locked: bool,
    /// True exactly once per lock; gates the notification.
    pub should_notify: bool,
}

#[async_trait]
pub trait UserStateStore: Send + Sync {
    /// Load the user's record, defaulting lazily when absent.
    async fn load(&self, user: Uuid) -> AuthResult<User2faState>;

    /// Persist the full record.
    async fn save(&self, user: Uuid, state: User2faState) -> AuthResult<()>;

    /// Destroy the record entirely ("remove 2FA for user").
    async fn remove(&self, user: Uuid) -> AuthResult<()>;

    /// Install a fresh login nonce, replacing any previous one.
    async fn put_nonce(&self, user: Uuid, record: StoredCode) -> AuthResult<()>;

    /// Atomically compare-and-burn the stored nonce.
    async fn consume_nonce(&self, user: Uuid, digest: &[u8], now: i64)
        -> AuthResult<NonceOutcome>;

    /// Install a fresh one-time email code, replacing any previous one.
    async fn put_email_code(&self, user: Uuid, record: StoredCode) -> AuthResult<()>;

    /// Atomically compare-and-burn the stored email code. Returns true only
    /// on a match before expiry; the code is removed on success or expiry.
    async fn consume_email_code(&self, user: Uuid, digest: &[u8], now: i64) -> AuthResult<bool>;

    /// Store a new batch of hashed backup codes. Returns the resulting
    /// count.
    async fn set_backup_codes(
        &self,
        user: Uuid,
        hashes: Vec<String>,
        mode: GenerateMode,
    ) -> AuthResult<usize>;

    /// Atomically verify-and-remove one backup code. `matcher` is called
    /// with each stored hash under the user's lock, so two concurrent
    /// presentations of the same code cannot both succeed.
    async fn consume_backup_code(
        &self,
        user: Uuid,
        matcher: &(dyn for<'a> Fn(&'a str) -> bool + Sync),
    ) -> AuthResult<bool>;

    /// Atomically bump the failed-attempt counter, restarting it when the
    /// previous window expired. Returns the new count.
    async fn record_failed_attempt(
        &self,
        user: Uuid,
        expires_at: i64,
        now: i64,
    ) -> AuthResult<u32>;

    async fn clear_attempts(&self, user: Uuid) -> AuthResult<()>;

    /// Record a successfully used TOTP step iff it is strictly greater than
    /// the last recorded one. Returns false on a replayed or older step.
    async fn commit_totp_step(&self, user: Uuid, step: i64) -> AuthResult<bool>;

    /// Idempotent lock transition.
    async fn lock_once(&self, user: Uuid) -> AuthResult<LockOutcome>;
}
