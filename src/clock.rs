//! Unix-time helper shared by the policy and login paths.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds.
///
/// Saturates at zero if the system clock is before the epoch rather than
/// panicking inside the login path.
#[must_use]
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
