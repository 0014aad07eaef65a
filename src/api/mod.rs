//! HTTP surface: routing, middleware and the server loop.

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderName, HeaderValue, Method, Request},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use uuid::Uuid;

use crate::core::AuthCore;
use crate::policy::SettingsHandle;

pub mod handlers;
pub mod openapi;

use handlers::{admin, enroll, health, login, users};

pub use openapi::openapi;

/// Build the application router with all middleware and shared state.
#[must_use]
pub fn router(core: Arc<AuthCore>, settings: Arc<SettingsHandle>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any);

    Router::new()
        .route("/live", get(health::live))
        .route("/health", get(health::health))
        .route("/openapi.json", get(openapi_json))
        .route("/login/decide", post(login::decide))
        .route("/login/verify", post(login::verify))
        .route("/login/resend-code", post(login::resend_code))
        .route("/login/dismiss-nag", post(login::dismiss_nag))
        .route("/enroll/totp", post(enroll::totp_begin))
        .route("/enroll/totp/confirm", post(enroll::totp_confirm))
        .route("/enroll/email", post(enroll::enable_email))
        .route("/enroll/backup-codes", post(enroll::backup_codes))
        .route("/users/:id/2fa", get(users::get_state))
        .route("/admin/users/:id/unlock", post(admin::unlock))
        .route("/admin/users/:id/2fa", delete(admin::remove_2fa))
        .route(
            "/admin/settings",
            get(admin::get_settings).put(admin::put_settings),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &Request<Body>| {
                        HeaderValue::from_str(Uuid::new_v4().to_string().as_str()).ok()
                    },
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(core))
                .layer(Extension(settings)),
        )
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::openapi())
}

/// Bind and serve until the process is stopped.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn serve(port: u16, core: Arc<AuthCore>, settings: Arc<SettingsHandle>) -> Result<()> {
    let app = router(core, settings);

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .context("Failed to bind listener")?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", path, ?headers, request_id)
}
