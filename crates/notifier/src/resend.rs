//! E-mail transport backed by the Resend HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{DeliveryError, Notification, Notifier};

/// Public Resend endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.resend.com";

/// Sender identity Resend accepts for unverified accounts.
pub const DEFAULT_FROM: &str = "Automation Flow <onboarding@resend.dev>";

/// Configuration for [`ResendNotifier`]. Every value is explicit; the
/// notifier never reads the environment.
#[derive(Debug, Clone)]
pub struct ResendConfig {
    pub api_key: String,
    /// Sender identity, e.g. `"Name <addr@domain>"`.
    pub from: String,
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ResendConfig {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            from: from.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Sends each notification as one e-mail through `POST {base_url}/emails`.
#[derive(Debug, Clone)]
pub struct ResendNotifier {
    config: ResendConfig,
    client: Client,
}

impl ResendNotifier {
    /// Build a notifier with its own HTTP client.
    ///
    /// # Errors
    /// [`DeliveryError::Transport`] if the HTTP client cannot be constructed.
    pub fn new(config: ResendConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeliveryError::transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn map_http_error(error: reqwest::Error) -> DeliveryError {
        if error.is_timeout() {
            DeliveryError::transport(format!("request timeout: {error}"))
        } else if error.is_connect() {
            DeliveryError::transport(format!("connection error: {error}"))
        } else {
            DeliveryError::transport(format!("HTTP error: {error}"))
        }
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    #[instrument(skip_all, fields(to = %notification.to))]
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let url = format!("{}/emails", self.config.base_url.trim_end_matches('/'));
        let request = SendEmailRequest {
            from: &self.config.from,
            to: [notification.to.as_str()],
            subject: &notification.subject,
            text: &notification.text,
            html: &notification.html,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(Self::map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            warn!(status = status.as_u16(), "e-mail rejected: {}", message);
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let sent: SendEmailResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::InvalidResponse { message: e.to_string() })?;
        debug!(email_id = %sent.id, "e-mail accepted");
        Ok(())
    }
}
