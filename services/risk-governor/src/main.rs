//! Risk Governor Service
//!
//! Hosts a governor with:
//! - Kill alert worker
//! - Health and metrics HTTP surface
//! - Shutdown on SIGINT/SIGTERM that drains pending alerts

use anyhow::Result;
use clap::Parser;
use risk_governor::{GovernorConfig, HealthExporter, RiskGovernor};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "risk-governor";

#[derive(Debug, Parser)]
#[command(name = SERVICE_NAME, version, about = "Kill-switch risk governor")]
struct Args {
    /// Configuration file (TOML/YAML/JSON); `RISK_GOVERNOR__*` env vars override it
    #[arg(short, long)]
    config: Option<String>,

    /// Override the health server listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Risk Governor Service v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = GovernorConfig::load(args.config.as_deref())?;
    let listen_addr = match args.listen {
        Some(addr) => addr,
        None => config
            .http
            .listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {}", config.http.listen_addr, e))?,
    };

    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);

    let (governor, alert_worker) = RiskGovernor::from_config(&config)?;
    let governor = Arc::new(governor);
    let alert_task = alert_worker.spawn();

    let mut server_shutdown = shutdown_tx.subscribe();
    let (_, server) = HealthExporter::new(Arc::clone(&governor)).bind(listen_addr, async move {
        let _ = server_shutdown.recv().await;
    })?;
    let server = tokio::spawn(server);

    let signal = wait_for_signal().await;
    info!(signal, "Shutdown requested");
    let _ = shutdown_tx.send(());

    if let Err(e) = server.await {
        error!("Health server task failed: {}", e);
    }

    // Kill alerts raised before shutdown must still go out
    governor.flush_alerts().await;
    drop(governor);
    if let Err(e) = alert_task.await {
        error!("Alert worker task failed: {}", e);
    }

    info!("Risk Governor Service shutdown complete");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info,warp=info", SERVICE_NAME.replace('-', "_")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();
}

/// Resolves with the name of the first stop signal received
async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                () = ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            },
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, stopping on Ctrl+C only");
                ctrl_c().await;
                "SIGINT"
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        "SIGINT"
    }
}

/// Ctrl+C, or never if the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Ctrl+C handler unavailable");
        std::future::pending::<()>().await;
    }
}
