//! Wiring for the 2FA core.
//!
//! [`AuthCore`] bundles the pluggable collaborators behind one handle that
//! the HTTP handlers and the login/enrollment flows share. Every seam has
//! an in-process default so the crate runs standalone; a host platform
//! swaps in its own implementations at construction time.

use std::sync::Arc;

use secrecy::SecretString;

use crate::backup::BackupCodeHasher;
use crate::directory::{MemoryDirectory, UserDirectory};
use crate::events::{EventSink, TracingSink};
use crate::mailer::{EmailSender, LogEmailSender};
use crate::otp::TotpConfig;
use crate::policy::{PolicySettings, SettingsHandle, SettingsProvider};
use crate::sessions::{NoopSessionControl, SessionControl};
use crate::store::{MemoryStateStore, UserStateStore};

pub struct AuthCore {
    pub directory: Arc<dyn UserDirectory>,
    pub store: Arc<dyn UserStateStore>,
    pub mailer: Arc<dyn EmailSender>,
    pub sessions: Arc<dyn SessionControl>,
    pub events: Arc<dyn EventSink>,
    pub settings: Arc<dyn SettingsProvider>,
    pub hasher: BackupCodeHasher,
    /// Issuer label embedded in provisioning URIs.
    pub issuer: String,
    pub totp: TotpConfig,
}

impl AuthCore {
    /// Core with in-memory defaults for every collaborator.
    #[must_use]
    pub fn new(issuer: &str, settings: PolicySettings) -> Self {
        Self {
            directory: MemoryDirectory::new(),
            store: MemoryStateStore::new(),
            mailer: Arc::new(LogEmailSender),
            sessions: Arc::new(NoopSessionControl),
            events: Arc::new(TracingSink),
            settings: SettingsHandle::new(settings),
            hasher: BackupCodeHasher::new(None),
            issuer: issuer.to_string(),
            totp: TotpConfig::default(),
        }
    }

    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = directory;
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn UserStateStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn EmailSender>) -> Self {
        self.mailer = mailer;
        self
    }

    #[must_use]
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionControl>) -> Self {
        self.sessions = sessions;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = settings;
        self
    }

    /// Site-wide secret mixed into backup-code hashes.
    #[must_use]
    pub fn with_backup_pepper(mut self, pepper: Option<SecretString>) -> Self {
        self.hasher = BackupCodeHasher::new(pepper);
        self
    }

    #[must_use]
    pub fn with_totp_config(mut self, totp: TotpConfig) -> Self {
        self.totp = totp;
        self
    }

    /// Settings snapshot for the current operation. Policy decisions within
    /// one request must all come from the same snapshot.
    #[must_use]
    pub fn settings_snapshot(&self) -> PolicySettings {
        self.settings.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_wire_up() {
        let core = AuthCore::new("Example", PolicySettings::default());
        assert_eq!(core.issuer, "Example");
        let snapshot = core.settings_snapshot();
        assert_eq!(snapshot, PolicySettings::default());
    }
}
