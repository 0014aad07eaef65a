//! Per-user enforcement evaluation.
//!
//! `evaluate` is a pure function of (settings snapshot, user profile); the
//! stateful `sync_user` recomputes a user's cached enforcement fields when
//! the settings hash changed and performs the idempotent grace-expiry →
//! lock transition. Evaluation cost is amortized to once per settings
//! change per user instead of every request.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::directory::UserProfile;
use crate::error::AuthResult;
use crate::events::{Event, EventSink};
use crate::policy::settings::{EnforcementPolicy, PolicySettings};
use crate::sessions::SessionControl;
use crate::store::{User2faState, UserStateStore};

/// The capability treated as "site admin equivalent".
const ADMIN_CAPABILITY: &str = "manage_options";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementState {
    #[default]
    Optional,
    Excluded,
    Enforced,
}

/// Result of the grace sub-decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraceOutcome {
    pub expiry: i64,
    /// No configuration window: the user is sent straight to setup and is
    /// exempt from the lock path.
    pub instant: bool,
}

/// Decide {optional, excluded, enforced} for one user. Pure and
/// deterministic for a fixed settings snapshot and profile.
#[must_use]
pub fn evaluate(settings: &PolicySettings, profile: &UserProfile) -> EnforcementState {
    if settings.exclude_superadmins && profile.super_admin {
        return EnforcementState::Excluded;
    }

    match settings.enforcement {
        EnforcementPolicy::DoNotEnforce => EnforcementState::Optional,
        EnforcementPolicy::AllUsers => {
            if settings.excluded_users.contains(&profile.login)
                || profile.has_any_role(&settings.excluded_roles)
            {
                return EnforcementState::Excluded;
            }
            if settings.multisite && excluded_by_sites(settings, profile) {
                return EnforcementState::Excluded;
            }
            EnforcementState::Enforced
        }
        EnforcementPolicy::SuperadminsOnly => {
            if profile.super_admin {
                EnforcementState::Enforced
            } else {
                EnforcementState::Optional
            }
        }
        EnforcementPolicy::SuperadminsSiteadminsOnly => {
            if profile.super_admin || profile.has_capability(ADMIN_CAPABILITY) {
                EnforcementState::Enforced
            } else {
                EnforcementState::Optional
            }
        }
        EnforcementPolicy::CertainRolesOnly | EnforcementPolicy::CertainUsersOnly => {
            if settings.enforced_users.contains(&profile.login)
                || profile.has_any_role(&settings.enforced_roles)
                || (settings.enforce_superadmins && profile.super_admin)
            {
                EnforcementState::Enforced
            } else {
                EnforcementState::Optional
            }
        }
        EnforcementPolicy::EnforceOnMultisite => {
            let on_included_site = profile
                .memberships
                .iter()
                .any(|m| settings.included_sites.contains(&m.site_id));
            if on_included_site {
                EnforcementState::Enforced
            } else {
                EnforcementState::Optional
            }
        }
    }
}

/// True when the user belongs only to excluded sites and to no included
/// site.
fn excluded_by_sites(settings: &PolicySettings, profile: &UserProfile) -> bool {
    if profile.memberships.is_empty() {
        return false;
    }
    let any_included = profile
        .memberships
        .iter()
        .any(|m| settings.included_sites.contains(&m.site_id));
    let all_excluded = profile
        .memberships
        .iter()
        .all(|m| settings.excluded_sites.contains(&m.site_id));
    all_excluded && !any_included
}

/// Grace sub-decision for a newly enforced, unconfigured user.
#[must_use]
pub fn apply_grace(settings: &PolicySettings, now: i64) -> GraceOutcome {
    let duration = settings.grace.duration_seconds();
    if duration == 0 {
        GraceOutcome {
            expiry: now,
            instant: true,
        }
    } else {
        GraceOutcome {
            expiry: now + duration,
            instant: false,
        }
    }
}

/// Recompute the user's cached enforcement fields when the settings hash
/// changed (or `force` is set), then run the lock sub-check.
///
/// The pass that first sets a grace expiry never locks on the same pass; a
/// subsequent evaluation does, exactly once, guarded by the sticky
/// notification flag.
///
/// # Errors
/// Propagates store and session-control failures.
pub async fn sync_user(
    store: &dyn UserStateStore,
    events: &dyn EventSink,
    sessions: &dyn SessionControl,
    settings: &PolicySettings,
    profile: &UserProfile,
    now: i64,
    force: bool,
) -> AuthResult<User2faState> {
    let hash = settings.hash();
    let mut state = store.load(profile.id).await?;

    let stale = force || state.settings_hash.as_deref() != Some(hash.as_str());
    let mut expiry_set_this_pass = false;

    if stale {
        let outcome = evaluate(settings, profile);
        debug!(user = %profile.id, ?outcome, "enforcement re-evaluated");
        state.enforcement = outcome;

        if outcome == EnforcementState::Excluded {
            // Exclusion forcibly disables 2FA for the user.
            if let Some(method) = state.enabled_method.take() {
                events.emit(Event::MethodRemoved {
                    user: profile.id,
                    method,
                });
            }
            state.grace_expiry = None;
            state.instant_enforcement = false;
        }

        state.needs_reconfigure = state
            .enabled_method
            .is_some_and(|method| !settings.method_enabled(method));

        match outcome {
            EnforcementState::Enforced if state.enabled_method.is_none() => {
                // A settings change restarts the configuration window; the
                // lock check runs on later passes only.
                let grace = apply_grace(settings, now);
                state.grace_expiry = Some(grace.expiry);
                state.instant_enforcement = grace.instant;
                expiry_set_this_pass = true;
            }
            EnforcementState::Enforced | EnforcementState::Optional => {
                // Configured or not enforced: no pending window.
                state.grace_expiry = None;
                state.instant_enforcement = false;
            }
            EnforcementState::Excluded => {}
        }

        // A settings change resets the nag dismissal.
        state.nag_dismissed = false;
        state.settings_hash = Some(hash);
        state.recompute_status();
        store.save(profile.id, state.clone()).await?;
    }

    if !expiry_set_this_pass && lock_due(&state, now) {
        let outcome = store.lock_once(profile.id).await?;
        state.locked = true;
        state.lock_notified = true;
        if outcome.should_notify {
            info!(user = %profile.id, "grace period lapsed, account locked");
            events.emit(Event::AccountLocked { user: profile.id });
            sessions.destroy_sessions(profile.id).await?;
        }
    }

    Ok(state)
}

/// Lock applies only to users whose configuration window actually lapsed:
/// enforced, unconfigured, not instant (those are held at setup instead),
/// expiry in the past.
fn lock_due(state: &User2faState, now: i64) -> bool {
    state.enforcement == EnforcementState::Enforced
        && state.enabled_method.is_none()
        && !state.instant_enforcement
        && !state.locked
        && state.grace_expiry.is_some_and(|expiry| expiry <= now)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::directory::{SiteMembership, UserProfile};
    use crate::events::RecordingSink;
    use crate::policy::settings::{GracePolicy, GraceUnit};
    use crate::sessions::NoopSessionControl;
    use crate::store::{MemoryStateStore, MethodId};
    use std::collections::BTreeSet;
    use uuid::Uuid;

    const NOW: i64 = 1_700_000_000;

    fn profile(login: &str, roles: &[&str]) -> UserProfile {
        UserProfile::single_site(Uuid::new_v4(), login, "user@example.com", roles)
    }

    #[test]
    fn do_not_enforce_is_optional() {
        let settings = PolicySettings::default();
        assert_eq!(
            evaluate(&settings, &profile("alice", &["editor"])),
            EnforcementState::Optional
        );
    }

    #[test]
    fn all_users_enforces_unless_excluded() {
        let mut settings = PolicySettings {
            enforcement: EnforcementPolicy::AllUsers,
            ..PolicySettings::default()
        };
        assert_eq!(
            evaluate(&settings, &profile("alice", &["editor"])),
            EnforcementState::Enforced
        );

        settings.excluded_users.insert("alice".to_string());
        assert_eq!(
            evaluate(&settings, &profile("alice", &["editor"])),
            EnforcementState::Excluded
        );

        settings.excluded_users.clear();
        settings.excluded_roles.insert("editor".to_string());
        assert_eq!(
            evaluate(&settings, &profile("alice", &["editor"])),
            EnforcementState::Excluded
        );
        assert_eq!(
            evaluate(&settings, &profile("bob", &["author"])),
            EnforcementState::Enforced
        );
    }

    #[test]
    fn all_users_multisite_site_exclusion() {
        let mut settings = PolicySettings {
            enforcement: EnforcementPolicy::AllUsers,
            multisite: true,
            ..PolicySettings::default()
        };
        settings.excluded_sites.insert(7);

        let mut user = profile("carol", &["editor"]);
        user.memberships = vec![SiteMembership {
            site_id: 7,
            roles: BTreeSet::from(["editor".to_string()]),
        }];
        assert_eq!(evaluate(&settings, &user), EnforcementState::Excluded);

        // Membership in an included site overrides the exclusion.
        settings.included_sites.insert(7);
        assert_eq!(evaluate(&settings, &user), EnforcementState::Enforced);
    }

    #[test]
    fn superadmin_exclusion_wins_over_everything() {
        let mut settings = PolicySettings {
            enforcement: EnforcementPolicy::AllUsers,
            exclude_superadmins: true,
            ..PolicySettings::default()
        };
        settings.enforced_users.insert("root".to_string());

        let mut user = profile("root", &["administrator"]);
        user.super_admin = true;
        assert_eq!(evaluate(&settings, &user), EnforcementState::Excluded);
    }

    #[test]
    fn superadmins_only_policies() {
        let settings = PolicySettings {
            enforcement: EnforcementPolicy::SuperadminsOnly,
            ..PolicySettings::default()
        };
        let mut admin = profile("root", &["administrator"]);
        admin.super_admin = true;
        assert_eq!(evaluate(&settings, &admin), EnforcementState::Enforced);
        assert_eq!(
            evaluate(&settings, &profile("alice", &["editor"])),
            EnforcementState::Optional
        );

        let settings = PolicySettings {
            enforcement: EnforcementPolicy::SuperadminsSiteadminsOnly,
            ..PolicySettings::default()
        };
        let mut siteadmin = profile("admin", &["administrator"]);
        siteadmin.capabilities.insert("manage_options".to_string());
        assert_eq!(evaluate(&settings, &siteadmin), EnforcementState::Enforced);
        assert_eq!(
            evaluate(&settings, &profile("alice", &["editor"])),
            EnforcementState::Optional
        );
    }

    #[test]
    fn certain_roles_and_users() {
        let mut settings = PolicySettings {
            enforcement: EnforcementPolicy::CertainRolesOnly,
            ..PolicySettings::default()
        };
        settings.enforced_roles.insert("editor".to_string());
        settings.enforced_users.insert("dave".to_string());

        assert_eq!(
            evaluate(&settings, &profile("alice", &["editor"])),
            EnforcementState::Enforced
        );
        assert_eq!(
            evaluate(&settings, &profile("dave", &["subscriber"])),
            EnforcementState::Enforced
        );
        assert_eq!(
            evaluate(&settings, &profile("bob", &["subscriber"])),
            EnforcementState::Optional
        );

        settings.enforce_superadmins = true;
        let mut root = profile("root", &[]);
        root.super_admin = true;
        assert_eq!(evaluate(&settings, &root), EnforcementState::Enforced);
    }

    #[test]
    fn enforce_on_multisite_by_included_site() {
        let mut settings = PolicySettings {
            enforcement: EnforcementPolicy::EnforceOnMultisite,
            multisite: true,
            ..PolicySettings::default()
        };
        settings.included_sites.insert(3);

        let mut user = profile("erin", &["author"]);
        user.memberships = vec![SiteMembership {
            site_id: 3,
            roles: BTreeSet::from(["author".to_string()]),
        }];
        assert_eq!(evaluate(&settings, &user), EnforcementState::Enforced);

        user.memberships[0].site_id = 4;
        assert_eq!(evaluate(&settings, &user), EnforcementState::Optional);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let mut settings = PolicySettings {
            enforcement: EnforcementPolicy::CertainUsersOnly,
            ..PolicySettings::default()
        };
        settings.enforced_users.insert("alice".to_string());
        let user = profile("alice", &["editor"]);
        let twin = UserProfile {
            id: Uuid::new_v4(),
            ..user.clone()
        };

        let first = evaluate(&settings, &user);
        assert_eq!(first, evaluate(&settings, &user));
        assert_eq!(first, evaluate(&settings, &twin));
    }

    #[test]
    fn grace_outcomes() {
        let instant = PolicySettings::default();
        assert_eq!(
            apply_grace(&instant, NOW),
            GraceOutcome {
                expiry: NOW,
                instant: true
            }
        );

        let windowed = PolicySettings {
            grace: GracePolicy::UseGracePeriod {
                value: 1,
                unit: GraceUnit::Hours,
            },
            ..PolicySettings::default()
        };
        assert_eq!(
            apply_grace(&windowed, NOW),
            GraceOutcome {
                expiry: NOW + 3600,
                instant: false
            }
        );
    }

    #[tokio::test]
    async fn sync_sets_grace_without_locking_on_same_pass() {
        let store = MemoryStateStore::new();
        let events = RecordingSink::new();
        let sessions = NoopSessionControl;
        let settings = PolicySettings {
            enforcement: EnforcementPolicy::AllUsers,
            grace: GracePolicy::UseGracePeriod {
                value: 1,
                unit: GraceUnit::Hours,
            },
            ..PolicySettings::default()
        };
        let user = profile("alice", &["editor"]);

        let state = sync_user(&*store, &events, &sessions, &settings, &user, NOW, false)
            .await
            .unwrap();
        assert_eq!(state.enforcement, EnforcementState::Enforced);
        assert_eq!(state.grace_expiry, Some(NOW + 3600));
        assert!(!state.instant_enforcement);
        assert!(!state.locked);
        assert_eq!(events.count("account_locked"), 0);
    }

    #[tokio::test]
    async fn grace_expiry_locks_exactly_once() {
        let store = MemoryStateStore::new();
        let events = RecordingSink::new();
        let sessions = NoopSessionControl;
        let settings = PolicySettings {
            enforcement: EnforcementPolicy::AllUsers,
            grace: GracePolicy::UseGracePeriod {
                value: 1,
                unit: GraceUnit::Hours,
            },
            ..PolicySettings::default()
        };
        let user = profile("alice", &["editor"]);

        sync_user(&*store, &events, &sessions, &settings, &user, NOW, false)
            .await
            .unwrap();

        // Clock advanced past the window; two evaluations in a row.
        let later = NOW + 3601;
        let state = sync_user(&*store, &events, &sessions, &settings, &user, later, false)
            .await
            .unwrap();
        assert!(state.locked);
        let state = sync_user(&*store, &events, &sessions, &settings, &user, later, false)
            .await
            .unwrap();
        assert!(state.locked);
        assert_eq!(events.count("account_locked"), 1);
    }

    #[tokio::test]
    async fn instant_enforcement_never_locks() {
        let store = MemoryStateStore::new();
        let events = RecordingSink::new();
        let sessions = NoopSessionControl;
        let settings = PolicySettings {
            enforcement: EnforcementPolicy::AllUsers,
            ..PolicySettings::default()
        };
        let user = profile("alice", &["editor"]);

        sync_user(&*store, &events, &sessions, &settings, &user, NOW, false)
            .await
            .unwrap();
        let state = sync_user(
            &*store,
            &events,
            &sessions,
            &settings,
            &user,
            NOW + 10_000,
            false,
        )
        .await
        .unwrap();
        assert!(state.instant_enforcement);
        assert!(!state.locked);
        assert_eq!(events.count("account_locked"), 0);
    }

    #[tokio::test]
    async fn exclusion_clears_enabled_method() {
        let store = MemoryStateStore::new();
        let events = RecordingSink::new();
        let sessions = NoopSessionControl;
        let user = profile("alice", &["editor"]);

        let mut state = store.load(user.id).await.unwrap();
        state.enabled_method = Some(MethodId::Totp);
        state.totp_secret = Some("MZXW6YTBOI".to_string());
        store.save(user.id, state).await.unwrap();

        let mut settings = PolicySettings {
            enforcement: EnforcementPolicy::AllUsers,
            ..PolicySettings::default()
        };
        settings.excluded_users.insert("alice".to_string());

        let state = sync_user(&*store, &events, &sessions, &settings, &user, NOW, false)
            .await
            .unwrap();
        assert_eq!(state.enforcement, EnforcementState::Excluded);
        assert_eq!(state.enabled_method, None);
        assert_eq!(events.count("method_removed"), 1);
    }

    #[tokio::test]
    async fn globally_disabled_method_flags_reconfigure() {
        let store = MemoryStateStore::new();
        let events = RecordingSink::new();
        let sessions = NoopSessionControl;
        let user = profile("alice", &["editor"]);

        let mut state = store.load(user.id).await.unwrap();
        state.enabled_method = Some(MethodId::Email);
        store.save(user.id, state).await.unwrap();

        let mut settings = PolicySettings::default();
        settings.enabled_methods.remove(&MethodId::Email);

        let state = sync_user(&*store, &events, &sessions, &settings, &user, NOW, false)
            .await
            .unwrap();
        assert!(state.needs_reconfigure);
        assert_eq!(state.enabled_method, Some(MethodId::Email));
    }

    #[tokio::test]
    async fn unchanged_hash_skips_re_evaluation() {
        let store = MemoryStateStore::new();
        let events = RecordingSink::new();
        let sessions = NoopSessionControl;
        let settings = PolicySettings {
            enforcement: EnforcementPolicy::AllUsers,
            ..PolicySettings::default()
        };
        let user = profile("alice", &["editor"]);

        let first = sync_user(&*store, &events, &sessions, &settings, &user, NOW, false)
            .await
            .unwrap();

        // Manually mark dismissed; a same-hash pass must not reset it.
        let mut state = store.load(user.id).await.unwrap();
        state.nag_dismissed = true;
        store.save(user.id, state).await.unwrap();

        let second = sync_user(&*store, &events, &sessions, &settings, &user, NOW, false)
            .await
            .unwrap();
        assert_eq!(first.settings_hash, second.settings_hash);
        assert!(second.nag_dismissed);
    }
}
