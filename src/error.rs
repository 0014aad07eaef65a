//! Authentication error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed base32 input to the codec. Data corruption or a programmer
    /// error, never a normal user-input failure.
    #[error("invalid base32 encoding")]
    InvalidEncoding,

    /// Submitted second-factor code is wrong. Retryable up to the attempt
    /// cap. The message intentionally does not reveal which method is
    /// active.
    #[error("invalid verification code")]
    AuthenticationFailed,

    /// Challenge token expired or did not match. Forces a restart from the
    /// credentials step; not retryable in place.
    #[error("login challenge is invalid or has expired")]
    NonceInvalid,

    /// Grace period lapsed without 2FA configuration. Cleared only by an
    /// administrative unlock.
    #[error("account is locked")]
    AccountLocked,

    /// Attempt cap reached; the whole login restarts from credentials.
    #[error("verification attempts exhausted")]
    AttemptsExhausted,

    /// Secret or code generation/storage failure. Fatal to the current
    /// operation, never silently retried.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    #[error("state store failure: {0}")]
    Store(String),

    #[error("user not found in directory")]
    UnknownUser,

    /// Operation requires an enabled method the user does not have.
    #[error("no second-factor method is enabled for this user")]
    MethodNotEnabled,
}

pub type AuthResult<T> = Result<T, AuthError>;
