//! Implementation of the `taskrelay serve` command.

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::http::{WebhookServer, WebhookState};
use crate::cli::Relay;
use crate::domain::models::Config;
use crate::infrastructure::logging::{LogRetention, SecretScrubber};

const RETENTION_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the configured listen host
    #[arg(long)]
    pub host: Option<String>,

    /// Override the configured listen port
    #[arg(long, short)]
    pub port: Option<u16>,
}

/// Secrets masked in logged webhook payloads.
fn configured_secrets(config: &Config) -> Vec<String> {
    [
        &config.clickup.api_key,
        &config.clickup.webhook_secret,
        &config.github.token,
        &config.github.webhook_secret,
    ]
    .into_iter()
    .flatten()
    .filter(|s| !s.is_empty())
    .cloned()
    .chain(config.agent.env.values().cloned())
    .collect()
}

pub async fn execute(args: ServeArgs, mut config: Config) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if config.max_concurrent_runs.is_none() {
        warn!("max_concurrent_runs is unset; every accepted webhook starts an agent immediately");
    }

    let scrubber =
        SecretScrubber::new(configured_secrets(&config)).context("Failed to build secret scrubber")?;
    let relay = Relay::build(config).await?;

    let retention = LogRetention::new(relay.config.logging.retention_days);
    let mut log_dirs = vec![relay.config.logging.run_log_dir.clone()];
    log_dirs.extend(relay.config.logging.log_dir.clone());
    tokio::spawn(async move {
        retention.run_periodic_cleanup(log_dirs, RETENTION_INTERVAL).await;
    });

    let state = WebhookState::new(Arc::clone(&relay.config), relay.orchestrator, scrubber);
    WebhookServer::new(state)
        .serve(shutdown_signal())
        .await
        .context("Webhook server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
