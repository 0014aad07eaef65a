//! Global policy settings and their change-detection hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::{Arc, RwLock};

use crate::store::MethodId;

/// Which users must use a second factor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EnforcementPolicy {
    #[default]
    DoNotEnforce,
    AllUsers,
    SuperadminsOnly,
    SuperadminsSiteadminsOnly,
    CertainRolesOnly,
    CertainUsersOnly,
    EnforceOnMultisite,
}

impl EnforcementPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DoNotEnforce => "do-not-enforce",
            Self::AllUsers => "all-users",
            Self::SuperadminsOnly => "superadmins-only",
            Self::SuperadminsSiteadminsOnly => "superadmins-siteadmins-only",
            Self::CertainRolesOnly => "certain-roles-only",
            Self::CertainUsersOnly => "certain-users-only",
            Self::EnforceOnMultisite => "enforce-on-multisite",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "do-not-enforce" => Some(Self::DoNotEnforce),
            "all-users" => Some(Self::AllUsers),
            "superadmins-only" => Some(Self::SuperadminsOnly),
            "superadmins-siteadmins-only" => Some(Self::SuperadminsSiteadminsOnly),
            "certain-roles-only" => Some(Self::CertainRolesOnly),
            "certain-users-only" => Some(Self::CertainUsersOnly),
            "enforce-on-multisite" => Some(Self::EnforceOnMultisite),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum GraceUnit {
    Hours,
    Days,
    /// Short windows for test installs.
    Seconds,
}

impl GraceUnit {
    #[must_use]
    pub const fn seconds(self) -> i64 {
        match self {
            Self::Hours => 3600,
            Self::Days => 86_400,
            Self::Seconds => 1,
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "hours" => Some(Self::Hours),
            "days" => Some(Self::Days),
            "seconds" => Some(Self::Seconds),
            _ => None,
        }
    }
}

/// Whether newly enforced users get a configuration window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case", tag = "policy")]
pub enum GracePolicy {
    #[default]
    NoGracePeriod,
    UseGracePeriod { value: u32, unit: GraceUnit },
}

impl GracePolicy {
    /// Window length in seconds; zero for instant enforcement.
    #[must_use]
    pub fn duration_seconds(self) -> i64 {
        match self {
            Self::NoGracePeriod => 0,
            Self::UseGracePeriod { value, unit } => i64::from(value) * unit.seconds(),
        }
    }
}

/// The policy-relevant global settings. Ordered collections keep the hash
/// canonical.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct PolicySettings {
    pub enforcement: EnforcementPolicy,
    pub enforced_roles: BTreeSet<String>,
    pub enforced_users: BTreeSet<String>,
    pub excluded_roles: BTreeSet<String>,
    pub excluded_users: BTreeSet<String>,
    pub included_sites: BTreeSet<u64>,
    pub excluded_sites: BTreeSet<u64>,
    pub multisite: bool,
    /// Super-admins are never enforced and any enabled method is cleared.
    pub exclude_superadmins: bool,
    /// Under the certain-roles/users policies, also enforce super-admins.
    pub enforce_superadmins: bool,
    pub grace: GracePolicy,
    /// Methods users may enable and be challenged with.
    pub enabled_methods: BTreeSet<MethodId>,
    pub limit_attempts: bool,
    pub max_attempts: u32,
    pub nonce_ttl_seconds: i64,
    pub email_code_ttl_seconds: i64,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            enforcement: EnforcementPolicy::DoNotEnforce,
            enforced_roles: BTreeSet::new(),
            enforced_users: BTreeSet::new(),
            excluded_roles: BTreeSet::new(),
            excluded_users: BTreeSet::new(),
            included_sites: BTreeSet::new(),
            excluded_sites: BTreeSet::new(),
            multisite: false,
            exclude_superadmins: false,
            enforce_superadmins: false,
            grace: GracePolicy::NoGracePeriod,
            enabled_methods: [MethodId::Totp, MethodId::Email, MethodId::BackupCodes]
                .into_iter()
                .collect(),
            limit_attempts: true,
            max_attempts: 5,
            nonce_ttl_seconds: 3600,
            email_code_ttl_seconds: 900,
        }
    }
}

impl PolicySettings {
    #[must_use]
    pub fn method_enabled(&self, method: MethodId) -> bool {
        self.enabled_methods.contains(&method)
    }

    /// Digest of the canonical serialization; per-user cached evaluation is
    /// invalidated when this changes.
    #[must_use]
    pub fn hash(&self) -> String {
        let canonical =
            serde_json::to_vec(self).expect("policy settings always serialize to JSON");
        let digest = Sha256::digest(&canonical);
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

/// Read access to the current settings snapshot.
pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> PolicySettings;
}

/// Swappable in-process settings, the default provider. Updates take effect
/// on the next evaluation through the hash-mismatch path.
pub struct SettingsHandle {
    inner: RwLock<PolicySettings>,
}

impl SettingsHandle {
    #[must_use]
    pub fn new(settings: PolicySettings) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(settings),
        })
    }

    /// Replace the active settings.
    ///
    /// # Panics
    /// Panics if the settings lock is poisoned.
    pub fn replace(&self, settings: PolicySettings) {
        *self.inner.write().expect("settings lock poisoned") = settings;
    }
}

impl SettingsProvider for SettingsHandle {
    fn current(&self) -> PolicySettings {
        self.inner.read().expect("settings lock poisoned").clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_for_identical_settings() {
        let a = PolicySettings::default();
        let b = PolicySettings::default();
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn hash_changes_with_any_policy_field() {
        let base = PolicySettings::default();

        let mut changed = base.clone();
        changed.enforcement = EnforcementPolicy::AllUsers;
        assert_ne!(base.hash(), changed.hash());

        let mut changed = base.clone();
        changed.excluded_roles.insert("editor".to_string());
        assert_ne!(base.hash(), changed.hash());

        let mut changed = base.clone();
        changed.grace = GracePolicy::UseGracePeriod {
            value: 2,
            unit: GraceUnit::Days,
        };
        assert_ne!(base.hash(), changed.hash());
    }

    #[test]
    fn grace_duration_units() {
        assert_eq!(GracePolicy::NoGracePeriod.duration_seconds(), 0);
        assert_eq!(
            GracePolicy::UseGracePeriod {
                value: 3,
                unit: GraceUnit::Hours
            }
            .duration_seconds(),
            3 * 3600
        );
        assert_eq!(
            GracePolicy::UseGracePeriod {
                value: 2,
                unit: GraceUnit::Days
            }
            .duration_seconds(),
            2 * 86_400
        );
    }

    #[test]
    fn policy_names_round_trip() {
        for policy in [
            EnforcementPolicy::DoNotEnforce,
            EnforcementPolicy::AllUsers,
            EnforcementPolicy::SuperadminsOnly,
            EnforcementPolicy::SuperadminsSiteadminsOnly,
            EnforcementPolicy::CertainRolesOnly,
            EnforcementPolicy::CertainUsersOnly,
            EnforcementPolicy::EnforceOnMultisite,
        ] {
            assert_eq!(EnforcementPolicy::parse(policy.as_str()), Some(policy));
        }
        assert_eq!(EnforcementPolicy::parse("bogus"), None);
    }

    #[test]
    fn settings_handle_replace_changes_hash() {
        let handle = SettingsHandle::new(PolicySettings::default());
        let before = handle.current().hash();
        let mut next = PolicySettings::default();
        next.enforcement = EnforcementPolicy::AllUsers;
        handle.replace(next);
        assert_ne!(handle.current().hash(), before);
    }
}
