//! HTTP handlers, grouped by concern.

pub mod admin;
pub mod enroll;
pub mod health;
pub mod login;
pub mod users;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::AuthError;

/// JSON error envelope returned by every failing endpoint.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// Boundary wrapper mapping domain errors to HTTP statuses.
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AuthError::InvalidEncoding | AuthError::Provisioning(_) => StatusCode::BAD_REQUEST,
            AuthError::AuthenticationFailed | AuthError::NonceInvalid => StatusCode::UNAUTHORIZED,
            AuthError::AccountLocked => StatusCode::LOCKED,
            AuthError::AttemptsExhausted => StatusCode::TOO_MANY_REQUESTS,
            AuthError::UnknownUser => StatusCode::NOT_FOUND,
            AuthError::MethodNotEnabled => StatusCode::CONFLICT,
            AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorBody {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses() {
        let cases = [
            (AuthError::AuthenticationFailed, StatusCode::UNAUTHORIZED),
            (AuthError::NonceInvalid, StatusCode::UNAUTHORIZED),
            (AuthError::AccountLocked, StatusCode::LOCKED),
            (AuthError::AttemptsExhausted, StatusCode::TOO_MANY_REQUESTS),
            (AuthError::UnknownUser, StatusCode::NOT_FOUND),
            (AuthError::MethodNotEnabled, StatusCode::CONFLICT),
            (AuthError::InvalidEncoding, StatusCode::BAD_REQUEST),
            (
                AuthError::Store("down".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let response = ApiError(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
