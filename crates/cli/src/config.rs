//! Delivery configuration shared by the `serve` and `run` sub-commands.
//!
//! Every value can come from a flag or its environment variable; `.env` is
//! loaded before parsing so local development needs no exports.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Args;
use tracing::info;

use engine::executor::DEFAULT_SUBJECT;
use engine::{ExecutorConfig, FlowExecutor, TokioTimer};
use notifier::resend::{DEFAULT_BASE_URL, DEFAULT_FROM};
use notifier::{LogNotifier, Notifier, ResendConfig, ResendNotifier};

#[derive(Debug, Clone, Args)]
pub struct DeliveryArgs {
    /// Resend API key. Required unless `--dry-run` is given.
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    pub resend_api_key: Option<String>,

    /// Sender identity for outgoing e-mail.
    #[arg(long, env = "FROM_EMAIL", default_value = DEFAULT_FROM)]
    pub from: String,

    #[arg(long, env = "RESEND_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub resend_base_url: String,

    /// Subject line of every notification.
    #[arg(long, env = "NOTIFICATION_SUBJECT", default_value = DEFAULT_SUBJECT)]
    pub subject: String,

    /// Per-request timeout for the e-mail provider, in seconds.
    #[arg(long, env = "DELIVERY_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Log notifications instead of sending them.
    #[arg(long)]
    pub dry_run: bool,
}

impl DeliveryArgs {
    /// Build the executor these settings describe.
    pub fn executor(&self) -> anyhow::Result<Arc<FlowExecutor>> {
        let notifier: Arc<dyn Notifier> = if self.dry_run {
            info!("dry run: notifications will only be logged");
            Arc::new(LogNotifier)
        } else {
            let Some(api_key) = self.resend_api_key.as_deref().filter(|k| !k.trim().is_empty())
            else {
                bail!("RESEND_API_KEY is not set (pass --resend-api-key or --dry-run)");
            };
            let config = ResendConfig {
                api_key: api_key.to_string(),
                from: self.from.clone(),
                base_url: self.resend_base_url.clone(),
                timeout: Duration::from_secs(self.timeout_secs),
            };
            Arc::new(ResendNotifier::new(config).context("failed to build e-mail transport")?)
        };

        let config = ExecutorConfig { subject: self.subject.clone() };
        Ok(Arc::new(FlowExecutor::new(notifier, Arc::new(TokioTimer), config)))
    }
}
