//! sentineld - Proctor Sentinel control-plane service
//!
//! Usage:
//!   sentineld --bind 0.0.0.0:8600
//!   sentineld --memory-audit --json

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sentinel_core::metrics::METRICS;
use sentinel_core::telemetry::init_tracing;
use sentinel_core::{MonitorConfig, SessionRegistry};
use sentinel_oracle::OracleConfig;
use sentinel_store::{AuditLog, SurrealAuditLog};
use sentineld::{build_router, AppState};
use tokio::net::TcpListener;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "sentineld")]
#[command(author = "Stevedores Org")]
#[command(version)]
#[command(about = "Real-time exam session integrity monitor")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "SENTINEL_BIND", default_value = "127.0.0.1:8600")]
    bind: SocketAddr,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Keep the audit trail in memory instead of SurrealDB
    #[arg(long, env = "SENTINEL_MEMORY_AUDIT")]
    memory_audit: bool,

    /// Seconds between metric flushes (0 disables)
    #[arg(long, env = "SENTINEL_METRICS_INTERVAL_SECS", default_value_t = 60)]
    metrics_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(args.json, level);

    let audit: Arc<dyn AuditLog> = if args.memory_audit {
        Arc::new(
            SurrealAuditLog::in_memory()
                .await
                .context("Failed to open in-memory audit store")?,
        )
    } else {
        Arc::new(
            SurrealAuditLog::from_env()
                .await
                .context("Failed to connect to audit store")?,
        )
    };

    let oracle_config = OracleConfig::from_env();
    let oracle = oracle_config
        .router()
        .context("Failed to build analysis oracle client")?;
    info!(
        oracle = %oracle_config.base_url,
        audio = oracle_config.audio_enabled,
        "analysis oracle configured"
    );

    let config = MonitorConfig::from_env();
    let registry = SessionRegistry::new(Arc::new(oracle), audit, config);

    let metrics_task = (args.metrics_interval > 0).then(|| {
        let period = Duration::from_secs(args.metrics_interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                METRICS.flush();
            }
        })
    });

    let app = build_router(AppState::new(registry.clone()));
    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!(addr = %args.bind, "sentineld listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    registry.shutdown().await;
    if let Some(task) = metrics_task {
        task.abort();
    }
    METRICS.flush();
    info!("sentineld stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
