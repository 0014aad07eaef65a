//! Session and cookie control interface.
//!
//! The login machine calls these at defined transition points: destroying
//! the password-only session before a challenge, invalidating everything on
//! lock, establishing the full session after a verified second factor. The
//! host platform supplies the real implementation.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::error::AuthResult;

#[async_trait]
pub trait SessionControl: Send + Sync {
    /// Invalidate every active session for the user.
    async fn destroy_sessions(&self, user: Uuid) -> AuthResult<()>;

    /// Drop the auth cookie for the current request.
    async fn clear_auth_cookie(&self, user: Uuid) -> AuthResult<()>;

    /// Establish the fully authenticated session.
    async fn set_auth_cookie(&self, user: Uuid, remember: bool) -> AuthResult<()>;
}

/// No-op implementation for standalone deployments where the caller manages
/// sessions itself.
#[derive(Clone, Debug, Default)]
pub struct NoopSessionControl;

#[async_trait]
impl SessionControl for NoopSessionControl {
    async fn destroy_sessions(&self, user: Uuid) -> AuthResult<()> {
        debug!(%user, "destroy_sessions noop");
        Ok(())
    }

    async fn clear_auth_cookie(&self, user: Uuid) -> AuthResult<()> {
        debug!(%user, "clear_auth_cookie noop");
        Ok(())
    }

    async fn set_auth_cookie(&self, user: Uuid, remember: bool) -> AuthResult<()> {
        debug!(%user, remember, "set_auth_cookie noop");
        Ok(())
    }
}
