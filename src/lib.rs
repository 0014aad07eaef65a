//! # Tessera (Second-Factor Authentication Core)
//!
//! `tessera` is the authentication-decision and code-verification core of a
//! two-factor login system. It owns the pieces that are independent of any
//! particular host platform:
//!
//! - **TOTP Codec:** RFC 6238/4226 one-time codes over a base32 shared
//!   secret, with a clock-drift window and step-replay protection.
//! - **Backup Codes:** A pool of single-use recovery codes, Argon2id-hashed
//!   with an optional server-side pepper.
//! - **Enforcement Policy:** A pure evaluator that decides, per user,
//!   whether 2FA is optional, excluded, or enforced, and tracks grace
//!   periods and account locking.
//! - **Login State Machine:** Orchestrates the post-password flow: allow,
//!   challenge, redirect to setup, or reject a locked account, with a
//!   single-use challenge token and a bounded attempt counter.
//!
//! Everything the host platform owns (user directory, persistence, email
//! delivery, session cookies, event consumers) is consumed through narrow
//! traits with in-process defaults, so the core runs standalone and under
//! test without external services.

pub mod api;
pub mod backup;
pub mod cli;
pub(crate) mod clock;
pub mod core;
pub mod directory;
pub mod enroll;
pub mod error;
pub mod events;
pub mod login;
pub mod mailer;
pub mod otp;
pub mod policy;
pub mod sessions;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
