//! Login flow endpoints: called by the host right after its password step.

use axum::{extract::Extension, http::StatusCode, response::Json};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{ApiError, ErrorBody};
use crate::core::AuthCore;
use crate::login::{LoginDecision, LoginFlow, VerifyOutcome};

#[derive(Deserialize, ToSchema)]
pub struct DecideRequest {
    pub user_id: Uuid,
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyRequest {
    pub user_id: Uuid,
    pub nonce: String,
    pub code: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct ResendRequest {
    pub user_id: Uuid,
    pub nonce: String,
}

#[derive(Deserialize, ToSchema)]
pub struct DismissNagRequest {
    pub user_id: Uuid,
}

#[utoipa::path(
    post,
    path = "/login/decide",
    request_body = DecideRequest,
    responses (
        (status = 200, description = "Next step for this login", body = LoginDecision),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "login",
)]
/// Decide what happens after a successful password check.
pub async fn decide(
    Extension(core): Extension<Arc<AuthCore>>,
    Json(request): Json<DecideRequest>,
) -> Result<Json<LoginDecision>, ApiError> {
    let flow = LoginFlow::new(core);
    let decision = flow.decide(request.user_id).await?;
    Ok(Json(decision))
}

#[utoipa::path(
    post,
    path = "/login/verify",
    request_body = VerifyRequest,
    responses (
        (status = 200, description = "Challenge settled", body = VerifyOutcome),
        (status = 404, description = "Unknown user", body = ErrorBody)
    ),
    tag = "login",
)]
/// Settle a pending second-factor challenge.
pub async fn verify(
    Extension(core): Extension<Arc<AuthCore>>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyOutcome>, ApiError> {
    let flow = LoginFlow::new(core);
    let outcome = flow
        .verify(
            request.user_id,
            &request.nonce,
            &request.code,
            request.remember,
        )
        .await?;
    Ok(Json(outcome))
}

#[utoipa::path(
    post,
    path = "/login/resend-code",
    request_body = ResendRequest,
    responses (
        (status = 204, description = "A fresh code was sent"),
        (status = 401, description = "No live challenge", body = ErrorBody),
        (status = 429, description = "Attempt limit reached", body = ErrorBody)
    ),
    tag = "login",
)]
/// Re-send the one-time email code for a live challenge.
pub async fn resend_code(
    Extension(core): Extension<Arc<AuthCore>>,
    Json(request): Json<ResendRequest>,
) -> Result<StatusCode, ApiError> {
    let flow = LoginFlow::new(core);
    flow.resend_email_code(request.user_id, &request.nonce)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/login/dismiss-nag",
    request_body = DismissNagRequest,
    responses (
        (status = 204, description = "Nag suppressed until the next settings change")
    ),
    tag = "login",
)]
/// Suppress the configure-2FA reminder for this user.
pub async fn dismiss_nag(
    Extension(core): Extension<Arc<AuthCore>>,
    Json(request): Json<DismissNagRequest>,
) -> Result<StatusCode, ApiError> {
    let flow = LoginFlow::new(core);
    flow.dismiss_nag(request.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
