//! Email delivery abstraction.
//!
//! The core only composes and hands off messages (one-time login codes,
//! lock notices); actual delivery belongs to the host platform. The default
//! sender logs instead of sending, for local development and tests.

use async_trait::async_trait;
use tracing::info;

use crate::error::AuthResult;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to surface as a provisioning
    /// failure.
    async fn send(&self, message: &EmailMessage) -> AuthResult<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> AuthResult<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}
