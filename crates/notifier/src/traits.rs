//! The `Notifier` trait — the contract every delivery transport must fulfil.

use async_trait::async_trait;
use serde::Serialize;

use crate::DeliveryError;

/// One outbound message, fully rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Recipient address.
    pub to: String,
    pub subject: String,
    /// Plain-text body.
    pub text: String,
    /// Rich (HTML) body.
    pub html: String,
}

/// Outbound delivery transport.
///
/// Implementations are network-bound and fallible; they must not retry on
/// their own.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `notification` once and report whether the provider accepted it.
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// A notifier that only logs what it would have sent.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        tracing::info!(
            to = %notification.to,
            subject = %notification.subject,
            "dry run: would deliver {} bytes",
            notification.text.len()
        );
        Ok(())
    }
}
