//! Login state machine.
//!
//! Bridges the host's password step and the second-factor step. `decide`
//! runs after a successful password check and says what happens next;
//! `verify` settles a pending challenge. All state lives in the
//! [`UserStateStore`](crate::store::UserStateStore), keyed by the challenge
//! nonce, so the machine itself is stateless and safe to share.

pub mod limiter;
pub mod methods;
pub mod nonce;

use std::fmt::Write as _;
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::unix_now;
use crate::core::AuthCore;
use crate::directory::{require_user, UserProfile};
use crate::error::{AuthError, AuthResult};
use crate::events::Event;
use crate::mailer::EmailMessage;
use crate::policy::{sync_user, EnforcementState, PolicySettings};
use crate::store::{MethodId, NonceOutcome, StoredCode};

pub use methods::{resolve, SecondFactor};

/// Digits in a one-time email code.
const EMAIL_CODE_LEN: usize = 8;

/// What the host should do after the password step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum LoginDecision {
    /// Grace period lapsed; only an administrative unlock proceeds.
    Locked,
    /// Hold the session and present the second-factor prompt.
    Challenge {
        nonce: String,
        method: MethodId,
        expires_at: i64,
    },
    /// No second factor required; finish the login.
    Allowed,
    /// Enforced with no configured method and no (remaining) grace window;
    /// send the user to 2FA setup instead of completing the login.
    SetupRequired,
    /// Allowed through, but remind the user to configure 2FA before the
    /// window closes. Shown at most once per settings change.
    GraceNag { expires_at: i64 },
}

/// Outcome of settling a challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// Second factor verified; the session has been established.
    Authenticated,
    /// Wrong code with attempts remaining; a fresh nonce replaces the burned
    /// one.
    Retry { nonce: String },
    /// Attempt cap reached. The login restarts from credentials.
    Exhausted,
    /// The nonce was missing, expired, or did not match. Restart from
    /// credentials.
    Restart,
}

/// The orchestrator. Cheap to clone; all collaborators sit behind the
/// shared [`AuthCore`].
#[derive(Clone)]
pub struct LoginFlow {
    core: Arc<AuthCore>,
}

impl LoginFlow {
    #[must_use]
    pub fn new(core: Arc<AuthCore>) -> Self {
        Self { core }
    }

    /// Decide the next step after a successful password check.
    ///
    /// # Errors
    /// Fails on unknown users and on store or mailer faults.
    pub async fn decide(&self, user: Uuid) -> AuthResult<LoginDecision> {
        self.decide_at(user, unix_now()).await
    }

    pub async fn decide_at(&self, user: Uuid, now: i64) -> AuthResult<LoginDecision> {
        let core = &self.core;
        let settings = core.settings_snapshot();
        let profile = require_user(&*core.directory, user).await?;
        let state = sync_user(
            &*core.store,
            &*core.events,
            &*core.sessions,
            &settings,
            &profile,
            now,
            false,
        )
        .await?;

        if state.locked && state.enforcement != EnforcementState::Excluded {
            return Ok(LoginDecision::Locked);
        }

        if let Some(method) = state.enabled_method {
            if settings.method_enabled(method) && !state.needs_reconfigure {
                // The password-only session must not survive into the
                // challenge window.
                core.sessions.clear_auth_cookie(user).await?;
                let expires_at = now + settings.nonce_ttl_seconds;
                let minted = nonce::mint(expires_at);
                core.store.put_nonce(user, minted.record).await?;
                if method == MethodId::Email {
                    self.issue_email_code(&profile, &settings, now).await?;
                }
                debug!(%user, method = method.as_str(), "second-factor challenge issued");
                return Ok(LoginDecision::Challenge {
                    nonce: minted.token,
                    method,
                    expires_at,
                });
            }
        }

        match state.enforcement {
            EnforcementState::Optional | EnforcementState::Excluded => Ok(LoginDecision::Allowed),
            EnforcementState::Enforced => {
                if state.instant_enforcement {
                    return Ok(LoginDecision::SetupRequired);
                }
                match state.grace_expiry {
                    Some(expires_at) if expires_at > now => {
                        if state.nag_dismissed {
                            Ok(LoginDecision::Allowed)
                        } else {
                            Ok(LoginDecision::GraceNag { expires_at })
                        }
                    }
                    // Enforced with no live window: configure before
                    // proceeding.
                    _ => Ok(LoginDecision::SetupRequired),
                }
            }
        }
    }

    /// Settle a pending challenge. The presented nonce is burned whatever
    /// the outcome.
    ///
    /// # Errors
    /// Fails on unknown users and on store or session faults.
    pub async fn verify(
        &self,
        user: Uuid,
        nonce_token: &str,
        code: &str,
        remember: bool,
    ) -> AuthResult<VerifyOutcome> {
        self.verify_at(user, nonce_token, code, remember, unix_now())
            .await
    }

    pub async fn verify_at(
        &self,
        user: Uuid,
        nonce_token: &str,
        code: &str,
        remember: bool,
        now: i64,
    ) -> AuthResult<VerifyOutcome> {
        let core = &self.core;
        let settings = core.settings_snapshot();
        require_user(&*core.directory, user).await?;

        let digest = nonce::digest(nonce_token);
        match core.store.consume_nonce(user, &digest, now).await? {
            NonceOutcome::Consumed => {}
            NonceOutcome::Mismatch | NonceOutcome::Expired | NonceOutcome::Missing => {
                debug!(%user, "challenge nonce rejected");
                return Ok(VerifyOutcome::Restart);
            }
        }

        if !limiter::check(&*core.store, &settings, user, now).await? {
            // Exhaustion forces a restart from credentials, so the counter
            // resets with it rather than also serving a cooldown.
            limiter::clear(&*core.store, user).await?;
            return Ok(VerifyOutcome::Exhausted);
        }

        let state = core.store.load(user).await?;
        let Some(method) = state.enabled_method else {
            return Ok(VerifyOutcome::Restart);
        };

        let mut used = method;
        let mut valid = resolve(method).validate(core, user, code, now).await?;
        // Backup codes stay usable as a fallback beside any primary method.
        if !valid && method != MethodId::BackupCodes && !state.backup_code_hashes.is_empty() {
            valid = resolve(MethodId::BackupCodes)
                .validate(core, user, code, now)
                .await?;
            used = MethodId::BackupCodes;
        }

        if valid {
            limiter::clear(&*core.store, user).await?;
            core.sessions.set_auth_cookie(user, remember).await?;
            core.events.emit(Event::UserAuthenticated {
                user,
                method: used,
            });
            info!(%user, method = used.as_str(), "second factor verified");
            return Ok(VerifyOutcome::Authenticated);
        }

        if limiter::record_failure(&*core.store, &settings, user, now).await? {
            let expires_at = now + settings.nonce_ttl_seconds;
            // Only the nonce rotates on a retry; an already issued email
            // code stays live until its own expiry.
            let minted = nonce::mint(expires_at);
            core.store.put_nonce(user, minted.record).await?;
            Ok(VerifyOutcome::Retry {
                nonce: minted.token,
            })
        } else {
            info!(%user, "verification attempts exhausted");
            limiter::clear(&*core.store, user).await?;
            Ok(VerifyOutcome::Exhausted)
        }
    }

    /// Re-send the one-time email code for a live challenge. Counts against
    /// the attempt limiter to stop mailbox flooding.
    ///
    /// # Errors
    /// `NonceInvalid` when no matching live challenge exists,
    /// `AttemptsExhausted` when the limiter is spent.
    pub async fn resend_email_code(&self, user: Uuid, nonce_token: &str) -> AuthResult<()> {
        self.resend_email_code_at(user, nonce_token, unix_now())
            .await
    }

    pub async fn resend_email_code_at(
        &self,
        user: Uuid,
        nonce_token: &str,
        now: i64,
    ) -> AuthResult<()> {
        let core = &self.core;
        let settings = core.settings_snapshot();
        let profile = require_user(&*core.directory, user).await?;

        let state = core.store.load(user).await?;
        if state.enabled_method != Some(MethodId::Email) {
            return Err(AuthError::MethodNotEnabled);
        }

        // Read-only nonce check; resending must not burn the challenge.
        let live = state.login_nonce.as_ref().is_some_and(|stored| {
            let digest = nonce::digest(nonce_token);
            stored.expires_at > now
                && stored.digest.len() == digest.len()
                && bool::from(stored.digest.ct_eq(&digest))
        });
        if !live {
            return Err(AuthError::NonceInvalid);
        }

        if !limiter::check(&*core.store, &settings, user, now).await? {
            return Err(AuthError::AttemptsExhausted);
        }
        limiter::record_failure(&*core.store, &settings, user, now).await?;

        self.issue_email_code(&profile, &settings, now).await
    }

    /// Suppress the grace nag until the next settings change.
    ///
    /// # Errors
    /// Fails on store faults.
    pub async fn dismiss_nag(&self, user: Uuid) -> AuthResult<()> {
        let mut state = self.core.store.load(user).await?;
        state.nag_dismissed = true;
        self.core.store.save(user, state).await
    }

    /// Generate, store (hashed) and mail a fresh one-time code.
    async fn issue_email_code(
        &self,
        profile: &UserProfile,
        settings: &PolicySettings,
        now: i64,
    ) -> AuthResult<()> {
        let core = &self.core;
        let code = random_email_code();
        let record = StoredCode {
            digest: Sha256::digest(code.as_bytes()).to_vec(),
            expires_at: now + settings.email_code_ttl_seconds,
        };
        core.store.put_email_code(profile.id, record).await?;
        let message = EmailMessage {
            to: profile.email.clone(),
            subject: format!("{} login verification code", core.issuer),
            body: format!(
                "Your verification code is {code}. It expires in {} minutes.",
                settings.email_code_ttl_seconds / 60
            ),
        };
        core.mailer.send(&message).await
    }
}

fn random_email_code() -> String {
    let mut rng = OsRng;
    let mut code = String::with_capacity(EMAIL_CODE_LEN);
    for _ in 0..EMAIL_CODE_LEN {
        let _ = write!(code, "{}", rng.gen_range(0..10u8));
    }
    code
}
