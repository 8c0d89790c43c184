// Copyright 2025
// Licensed under the Elastic License v2.0

#![warn(clippy::all)]

use std::sync::Arc;

use anyhow::Result;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use voltload::connectors::destinations::{HttpDestination, HttpDestinationConfig};
use voltload::connectors::sources::PostgresRowSource;
use voltload::{Bridge, BridgeMode, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    dotenv().ok();

    let config = Config::from_env()?;
    config.print_banner();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        warn!("Shutdown signal received, interrupting run");
        on_signal.cancel();
    });

    let destination = Arc::new(HttpDestination::new(HttpDestinationConfig {
        default_port: config.http_port,
        user: config.user.clone(),
        password: config.password.clone(),
        ..Default::default()
    })?);

    let bridge = Bridge::setup(config.mode, &config.params, destination, cancel)?;
    let mut source = PostgresRowSource::open(&config.source_url, &config.source_query).await?;

    let mut statuses: Vec<i64> = Vec::new();
    let report = bridge.run(&mut source, &mut statuses).await?;

    if config.mode == BridgeMode::Call {
        let failed = statuses.iter().filter(|s| **s != 0).count();
        info!("Row statuses: {} ok, {} failed", statuses.len() - failed, failed);
    }
    info!(
        "Run complete: {} row(s) read, {} failed{}",
        report.rows_read,
        report.failed_rows,
        if report.stopped_on_limit { " (stopped at error limit)" } else { "" }
    );

    Ok(())
}
