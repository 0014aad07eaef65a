//! Enrollment endpoints: enabling and confirming second-factor methods.

use axum::{extract::Extension, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{ApiError, ErrorBody};
use crate::backup::GenerateMode;
use crate::core::AuthCore;
use crate::enroll::{Enrollment, TotpEnrollment};

#[derive(Deserialize, ToSchema)]
pub struct EnrollRequest {
    pub user_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct ConfirmTotpRequest {
    pub user_id: Uuid,
    pub code: String,
}

#[derive(Deserialize, ToSchema)]
pub struct BackupCodesRequest {
    pub user_id: Uuid,
    pub mode: GenerateMode,
}

/// Plaintext codes, shown to the user exactly once.
#[derive(Serialize, ToSchema)]
pub struct BackupCodesResponse {
    pub codes: Vec<String>,
}

#[utoipa::path(
    post,
    path = "/enroll/totp",
    request_body = EnrollRequest,
    responses (
        (status = 200, description = "Pending secret and provisioning URI", body = TotpEnrollment),
        (status = 400, description = "Method disabled site-wide", body = ErrorBody),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "enroll",
)]
/// Start authenticator-app enrollment.
pub async fn totp_begin(
    Extension(core): Extension<Arc<AuthCore>>,
    Json(request): Json<EnrollRequest>,
) -> Result<Json<TotpEnrollment>, ApiError> {
    let enrollment = Enrollment::new(core).totp_begin(request.user_id).await?;
    Ok(Json(enrollment))
}

#[utoipa::path(
    post,
    path = "/enroll/totp/confirm",
    request_body = ConfirmTotpRequest,
    responses (
        (status = 204, description = "Authenticator confirmed and enabled"),
        (status = 401, description = "Wrong code", body = ErrorBody),
        (status = 400, description = "No enrollment in progress", body = ErrorBody)
    ),
    tag = "enroll",
)]
/// Confirm enrollment with the first code from the authenticator.
pub async fn totp_confirm(
    Extension(core): Extension<Arc<AuthCore>>,
    Json(request): Json<ConfirmTotpRequest>,
) -> Result<StatusCode, ApiError> {
    Enrollment::new(core)
        .totp_confirm(request.user_id, &request.code)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/enroll/email",
    request_body = EnrollRequest,
    responses (
        (status = 204, description = "Email method enabled"),
        (status = 400, description = "Method disabled site-wide", body = ErrorBody)
    ),
    tag = "enroll",
)]
/// Enable the email-code method.
pub async fn enable_email(
    Extension(core): Extension<Arc<AuthCore>>,
    Json(request): Json<EnrollRequest>,
) -> Result<StatusCode, ApiError> {
    Enrollment::new(core).enable_email(request.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/enroll/backup-codes",
    request_body = BackupCodesRequest,
    responses (
        (status = 200, description = "Fresh plaintext codes", body = BackupCodesResponse),
        (status = 400, description = "Method disabled site-wide", body = ErrorBody)
    ),
    tag = "enroll",
)]
/// Generate a batch of single-use backup codes.
pub async fn backup_codes(
    Extension(core): Extension<Arc<AuthCore>>,
    Json(request): Json<BackupCodesRequest>,
) -> Result<Json<BackupCodesResponse>, ApiError> {
    let batch = Enrollment::new(core)
        .regenerate_backup_codes(request.user_id, request.mode)
        .await?;
    Ok(Json(BackupCodesResponse { codes: batch.codes }))
}
