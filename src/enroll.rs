//! Provisioning operations: enabling, confirming, and removing second
//! factors, plus the administrative unlock.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::backup::{BackupCodeBatch, GenerateMode};
use crate::clock::unix_now;
use crate::core::AuthCore;
use crate::directory::require_user;
use crate::error::{AuthError, AuthResult};
use crate::events::Event;
use crate::otp::{is_valid_authcode_at, provisioning_uri, Secret, DEFAULT_KEY_BITS};
use crate::store::MethodId;

/// Material handed to the user when TOTP enrollment starts. The secret is
/// pending until the first code confirms the authenticator was provisioned.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct TotpEnrollment {
    pub secret: String,
    pub otpauth_uri: String,
}

#[derive(Clone)]
pub struct Enrollment {
    core: Arc<AuthCore>,
}

impl Enrollment {
    #[must_use]
    pub fn new(core: Arc<AuthCore>) -> Self {
        Self { core }
    }

    /// Start TOTP enrollment: mint a secret, stash it as pending, and return
    /// it with the provisioning URI for the QR code.
    ///
    /// # Errors
    /// `Provisioning` when the method is globally disabled; store faults.
    pub async fn totp_begin(&self, user: Uuid) -> AuthResult<TotpEnrollment> {
        let core = &self.core;
        let settings = core.settings_snapshot();
        if !settings.method_enabled(MethodId::Totp) {
            return Err(AuthError::Provisioning(
                "authenticator app method is not enabled site-wide".to_string(),
            ));
        }
        let profile = require_user(&*core.directory, user).await?;

        let secret = Secret::generate(DEFAULT_KEY_BITS);
        let mut state = core.store.load(user).await?;
        state.pending_totp_secret = Some(secret.as_base32().to_string());
        core.store.save(user, state).await?;

        Ok(TotpEnrollment {
            otpauth_uri: provisioning_uri(&secret, &core.issuer, &profile.login, &core.totp),
            secret: secret.as_base32().to_string(),
        })
    }

    /// Confirm enrollment with the first code from the authenticator,
    /// promoting the pending secret.
    ///
    /// # Errors
    /// `Provisioning` when no enrollment is in progress,
    /// `AuthenticationFailed` on a wrong code.
    pub async fn totp_confirm(&self, user: Uuid, code: &str) -> AuthResult<()> {
        self.totp_confirm_at(user, code, unix_now()).await
    }

    pub async fn totp_confirm_at(&self, user: Uuid, code: &str, now: i64) -> AuthResult<()> {
        let core = &self.core;
        require_user(&*core.directory, user).await?;

        let mut state = core.store.load(user).await?;
        let Some(pending) = state.pending_totp_secret.clone() else {
            return Err(AuthError::Provisioning(
                "no authenticator enrollment in progress".to_string(),
            ));
        };
        let secret = Secret::from_base32(&pending)?;
        let Some(step) = is_valid_authcode_at(&secret, code, now, &core.totp)? else {
            return Err(AuthError::AuthenticationFailed);
        };

        state.totp_secret = Some(pending);
        state.pending_totp_secret = None;
        state.enabled_method = Some(MethodId::Totp);
        state.last_totp_step = Some(step);
        // Configuration ends any pending grace window.
        state.grace_expiry = None;
        state.instant_enforcement = false;
        state.needs_reconfigure = false;
        state.recompute_status();
        core.store.save(user, state).await?;

        info!(%user, "authenticator app enrolled");
        core.events.emit(Event::MethodSet {
            user,
            method: MethodId::Totp,
        });
        Ok(())
    }

    /// Enable the email-code method. No confirmation step: the address
    /// already belongs to the account.
    ///
    /// # Errors
    /// `Provisioning` when the method is globally disabled; store faults.
    pub async fn enable_email(&self, user: Uuid) -> AuthResult<()> {
        let core = &self.core;
        let settings = core.settings_snapshot();
        if !settings.method_enabled(MethodId::Email) {
            return Err(AuthError::Provisioning(
                "email method is not enabled site-wide".to_string(),
            ));
        }
        require_user(&*core.directory, user).await?;

        let mut state = core.store.load(user).await?;
        state.enabled_method = Some(MethodId::Email);
        state.grace_expiry = None;
        state.instant_enforcement = false;
        state.needs_reconfigure = false;
        state.recompute_status();
        core.store.save(user, state).await?;

        core.events.emit(Event::MethodSet {
            user,
            method: MethodId::Email,
        });
        Ok(())
    }

    /// Mint a batch of backup codes. The plaintext codes leave this function
    /// exactly once; only hashes are stored.
    ///
    /// # Errors
    /// `Provisioning` when the method is globally disabled; store faults.
    pub async fn regenerate_backup_codes(
        &self,
        user: Uuid,
        mode: GenerateMode,
    ) -> AuthResult<BackupCodeBatch> {
        let core = &self.core;
        let settings = core.settings_snapshot();
        if !settings.method_enabled(MethodId::BackupCodes) {
            return Err(AuthError::Provisioning(
                "backup codes are not enabled site-wide".to_string(),
            ));
        }
        require_user(&*core.directory, user).await?;

        let batch = core.hasher.generate_batch()?;
        let stored = core
            .store
            .set_backup_codes(user, batch.code_hashes.clone(), mode)
            .await?;
        info!(%user, stored, "backup codes generated");
        Ok(batch)
    }

    /// Remove all second-factor material for the user. The store record is
    /// destroyed outright.
    ///
    /// # Errors
    /// Fails on store faults.
    pub async fn remove_user_2fa(&self, user: Uuid) -> AuthResult<()> {
        let core = &self.core;
        let state = core.store.load(user).await?;
        core.store.remove(user).await?;
        if let Some(method) = state.enabled_method {
            core.events.emit(Event::MethodRemoved { user, method });
        }
        info!(%user, "second-factor state removed");
        Ok(())
    }

    /// Administrative unlock: clears the lock and restarts the grace window
    /// from now.
    ///
    /// # Errors
    /// Fails on unknown users and store faults.
    pub async fn unlock(&self, user: Uuid) -> AuthResult<()> {
        self.unlock_at(user, unix_now()).await
    }

    pub async fn unlock_at(&self, user: Uuid, now: i64) -> AuthResult<()> {
        let core = &self.core;
        let settings = core.settings_snapshot();
        require_user(&*core.directory, user).await?;

        let mut state = core.store.load(user).await?;
        state.locked = false;
        state.lock_notified = false;
        if state.enabled_method.is_none() {
            let grace = crate::policy::apply_grace(&settings, now);
            state.grace_expiry = Some(grace.expiry);
            state.instant_enforcement = grace.instant;
        }
        core.store.save(user, state).await?;

        info!(%user, "account unlocked");
        core.events.emit(Event::AccountUnlocked { user });
        Ok(())
    }
}
