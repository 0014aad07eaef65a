//! Per-user 2FA state, without secret material.

use axum::{
    extract::{Extension, Path},
    response::Json,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{ApiError, ErrorBody};
use crate::core::AuthCore;
use crate::directory::require_user;
use crate::policy::EnforcementState;
use crate::store::{MethodId, UserStatus};

/// Safe projection of the stored record. Secrets, hashes and live codes
/// never leave the store through this endpoint.
#[derive(Serialize, ToSchema)]
pub struct UserStateView {
    pub user_id: Uuid,
    pub enabled_method: Option<MethodId>,
    pub status: UserStatus,
    pub enforcement: EnforcementState,
    pub grace_expiry: Option<i64>,
    pub locked: bool,
    pub needs_reconfigure: bool,
    pub backup_codes_remaining: usize,
}

#[utoipa::path(
    get,
    path = "/users/{id}/2fa",
    params(
        ("id" = Uuid, Path, description = "User id")
    ),
    responses (
        (status = 200, description = "Current 2FA state", body = UserStateView),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "users",
)]
/// Fetch the user's current 2FA state.
pub async fn get_state(
    Extension(core): Extension<Arc<AuthCore>>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserStateView>, ApiError> {
    require_user(&*core.directory, id).await?;
    let state = core.store.load(id).await?;
    Ok(Json(UserStateView {
        user_id: id,
        enabled_method: state.enabled_method,
        status: state.status,
        enforcement: state.enforcement,
        grace_expiry: state.grace_expiry,
        locked: state.locked,
        needs_reconfigure: state.needs_reconfigure,
        backup_codes_remaining: state.backup_code_hashes.len(),
    }))
}
