//! Administrative endpoints: unlock, removal, policy settings.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::{ApiError, ErrorBody};
use crate::core::AuthCore;
use crate::enroll::Enrollment;
use crate::policy::{PolicySettings, SettingsHandle, SettingsProvider};

#[utoipa::path(
    post,
    path = "/admin/users/{id}/unlock",
    params(
        ("id" = Uuid, Path, description = "User id")
    ),
    responses (
        (status = 204, description = "Account unlocked, grace window restarted"),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "admin",
)]
/// Unlock a locked account and restart its grace window.
pub async fn unlock(
    Extension(core): Extension<Arc<AuthCore>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    Enrollment::new(core).unlock(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/admin/users/{id}/2fa",
    params(
        ("id" = Uuid, Path, description = "User id")
    ),
    responses (
        (status = 204, description = "All second-factor state destroyed")
    ),
    tag = "admin",
)]
/// Remove all second-factor material for a user.
pub async fn remove_2fa(
    Extension(core): Extension<Arc<AuthCore>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    Enrollment::new(core).remove_user_2fa(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/admin/settings",
    responses (
        (status = 200, description = "Active policy settings", body = PolicySettings)
    ),
    tag = "admin",
)]
/// Fetch the active policy settings.
pub async fn get_settings(
    Extension(settings): Extension<Arc<SettingsHandle>>,
) -> Json<PolicySettings> {
    Json(settings.current())
}

#[utoipa::path(
    put,
    path = "/admin/settings",
    request_body = PolicySettings,
    responses (
        (status = 204, description = "Settings replaced; users re-evaluate on next login")
    ),
    tag = "admin",
)]
/// Replace the active policy settings. Per-user enforcement is recomputed
/// lazily through the settings-hash mismatch on the next login.
pub async fn put_settings(
    Extension(settings): Extension<Arc<SettingsHandle>>,
    Json(next): Json<PolicySettings>,
) -> StatusCode {
    settings.replace(next);
    StatusCode::NO_CONTENT
}
