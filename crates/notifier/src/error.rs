//! Delivery error type.

use serde::Serialize;
use thiserror::Error;

/// Errors returned by [`crate::Notifier::deliver`].
///
/// The engine never retries: any variant ends the run that produced it.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryError {
    /// The request never got a response (connect failure, timeout, …).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The provider answered with a non-success status.
    #[error("delivery rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The provider answered 2xx but the body could not be understood.
    #[error("invalid provider response: {message}")]
    InvalidResponse { message: String },
}

impl DeliveryError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into() }
    }
}
