//! `automation-flow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`    — start the API server.
//! - `run`      — execute a flow JSON file in the foreground.
//! - `validate` — validate a flow JSON file.

mod config;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::DeliveryArgs;
use engine::{FlowModel, RunContext};

#[derive(Parser)]
#[command(
    name = "automation-flow",
    about = "Runs timed notification flows",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:4000")]
        bind: String,
        /// Browser origin allowed by CORS.
        #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:3000")]
        cors_origin: String,
        #[command(flatten)]
        delivery: DeliveryArgs,
    },
    /// Execute a flow definition JSON file and wait for it to finish.
    Run {
        /// Path to the flow JSON file.
        path: PathBuf,
        /// Recipient address for every action step.
        #[arg(long)]
        to: String,
        #[command(flatten)]
        delivery: DeliveryArgs,
    },
    /// Validate a flow definition JSON file.
    Validate {
        /// Path to the flow JSON file.
        path: PathBuf,
    },
}

fn read_flow(path: &Path) -> anyhow::Result<FlowModel> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).context("invalid flow JSON")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, cors_origin, delivery } => {
            info!("Starting API server on {bind}");
            let state = api::AppState::new(delivery.executor()?);
            api::serve(&bind, state, Some(&cors_origin), shutdown_signal()).await?;
        }
        Command::Run { path, to, delivery } => {
            let flow = read_flow(&path)?;
            let executor = delivery.executor()?;

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                info!("ctrl-c received, cancelling run");
                on_ctrl_c.cancel();
            });

            let outcome = executor.run(&flow, &RunContext::new(to), &cancel).await;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.reached_end() {
                std::process::exit(1);
            }
        }
        Command::Validate { path } => {
            let flow = read_flow(&path)?;
            match engine::validate_flow(&flow) {
                Ok(order) => {
                    println!("✅ Flow is valid. Walk order: {order:?}");
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
