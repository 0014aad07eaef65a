//! Failed-attempt limiter for the second-factor step.
//!
//! Counts live in the user's store record so the limit holds across
//! processes. The window restarts rather than slides: the expiry is set on
//! the first failure and reused until it lapses.

use uuid::Uuid;

use crate::error::AuthResult;
use crate::policy::PolicySettings;
use crate::store::UserStateStore;

/// Window length for the failed-attempt counter.
const ATTEMPT_WINDOW_SECONDS: i64 = 15 * 60;

/// True while the user may still attempt verification. Always true when the
/// limiter feature is disabled.
pub async fn check(
    store: &dyn UserStateStore,
    settings: &PolicySettings,
    user: Uuid,
    now: i64,
) -> AuthResult<bool> {
    if !settings.limit_attempts {
        return Ok(true);
    }
    let state = store.load(user).await?;
    let window_live = state.attempts_expire_at.is_some_and(|at| at > now);
    Ok(!window_live || state.failed_attempts < settings.max_attempts)
}

/// Record one failure and return whether attempts remain.
pub async fn record_failure(
    store: &dyn UserStateStore,
    settings: &PolicySettings,
    user: Uuid,
    now: i64,
) -> AuthResult<bool> {
    if !settings.limit_attempts {
        return Ok(true);
    }
    let count = store
        .record_failed_attempt(user, now + ATTEMPT_WINDOW_SECONDS, now)
        .await?;
    Ok(count < settings.max_attempts)
}

/// Reset the counter, on success or on an explicit restart.
pub async fn clear(store: &dyn UserStateStore, user: Uuid) -> AuthResult<()> {
    store.clear_attempts(user).await
}
