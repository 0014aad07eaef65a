use utoipa::OpenApi;

use super::handlers::{admin, enroll, health, login, users, ErrorBody};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::live,
        health::health,
        login::decide,
        login::verify,
        login::resend_code,
        login::dismiss_nag,
        enroll::totp_begin,
        enroll::totp_confirm,
        enroll::enable_email,
        enroll::backup_codes,
        users::get_state,
        admin::unlock,
        admin::remove_2fa,
        admin::get_settings,
        admin::put_settings,
    ),
    components(schemas(
        ErrorBody,
        health::Health,
        login::DecideRequest,
        login::VerifyRequest,
        login::ResendRequest,
        login::DismissNagRequest,
        enroll::EnrollRequest,
        enroll::ConfirmTotpRequest,
        enroll::BackupCodesRequest,
        enroll::BackupCodesResponse,
        users::UserStateView,
        crate::enroll::TotpEnrollment,
        crate::login::LoginDecision,
        crate::login::VerifyOutcome,
        crate::policy::PolicySettings,
    )),
    tags(
        (name = "health", description = "Service probes"),
        (name = "login", description = "Post-password login flow"),
        (name = "enroll", description = "Second-factor enrollment"),
        (name = "users", description = "Per-user 2FA state"),
        (name = "admin", description = "Administrative operations"),
    )
)]
pub struct ApiDoc;

/// The generated `OpenAPI` document.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn document_covers_all_routes() {
        let doc = openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/live",
            "/health",
            "/login/decide",
            "/login/verify",
            "/login/resend-code",
            "/login/dismiss-nag",
            "/enroll/totp",
            "/enroll/totp/confirm",
            "/enroll/email",
            "/enroll/backup-codes",
            "/users/{id}/2fa",
            "/admin/users/{id}/unlock",
            "/admin/users/{id}/2fa",
            "/admin/settings",
        ] {
            assert!(paths.contains_key(path), "missing path {path}");
        }
    }

    #[test]
    fn document_serializes() {
        let json = openapi().to_json().unwrap();
        assert!(json.contains("\"openapi\""));
    }
}
