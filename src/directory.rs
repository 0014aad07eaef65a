//! Read-only user directory interface.
//!
//! The host platform owns user records; the core only needs login, email,
//! role/site memberships and the super-admin bit as opaque inputs to the
//! policy evaluator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

/// Site id used for single-site installs.
pub const DEFAULT_SITE: u64 = 1;

/// A user's roles on one site.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteMembership {
    pub site_id: u64,
    pub roles: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub login: String,
    pub email: String,
    pub memberships: Vec<SiteMembership>,
    /// Flattened capability slugs; the evaluator only consults
    /// `manage_options` as the admin-equivalence heuristic.
    pub capabilities: BTreeSet<String>,
    pub super_admin: bool,
}

impl UserProfile {
    /// Minimal single-site profile, used by tests and the demo directory.
    #[must_use]
    pub fn single_site(id: Uuid, login: &str, email: &str, roles: &[&str]) -> Self {
        Self {
            id,
            login: login.to_string(),
            email: email.to_string(),
            memberships: vec![SiteMembership {
                site_id: DEFAULT_SITE,
                roles: roles.iter().map(ToString::to_string).collect(),
            }],
            capabilities: BTreeSet::new(),
            super_admin: false,
        }
    }

    /// All roles across every site membership.
    pub fn all_roles(&self) -> impl Iterator<Item = &str> {
        self.memberships
            .iter()
            .flat_map(|m| m.roles.iter().map(String::as_str))
    }

    #[must_use]
    pub fn has_any_role(&self, roles: &BTreeSet<String>) -> bool {
        self.all_roles().any(|role| roles.contains(role))
    }

    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up a user by id. `Ok(None)` means the user does not exist.
    async fn lookup(&self, id: Uuid) -> AuthResult<Option<UserProfile>>;
}

/// In-process directory, the default for tests and standalone deployments.
#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<Uuid, UserProfile>>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn upsert(&self, profile: UserProfile) {
        self.users.write().await.insert(profile.id, profile);
    }

    pub async fn remove(&self, id: Uuid) {
        self.users.write().await.remove(&id);
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn lookup(&self, id: Uuid) -> AuthResult<Option<UserProfile>> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}

/// Convenience for call sites that treat a missing user as an error.
pub async fn require_user(directory: &dyn UserDirectory, id: Uuid) -> AuthResult<UserProfile> {
    directory.lookup(id).await?.ok_or(AuthError::UnknownUser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_directory_round_trip() {
        let directory = MemoryDirectory::new();
        let id = Uuid::new_v4();
        let profile = UserProfile::single_site(id, "alice", "alice@example.com", &["editor"]);
        directory.upsert(profile.clone()).await;

        let found = directory.lookup(id).await.unwrap();
        assert_eq!(found, Some(profile));

        directory.remove(id).await;
        assert_eq!(directory.lookup(id).await.unwrap(), None);
    }

    #[test]
    fn role_and_capability_checks() {
        let profile =
            UserProfile::single_site(Uuid::new_v4(), "bob", "bob@example.com", &["author"]);
        let mut roles = BTreeSet::new();
        roles.insert("author".to_string());
        assert!(profile.has_any_role(&roles));
        assert!(!profile.has_capability("manage_options"));
    }
}
