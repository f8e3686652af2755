//! uprelay server binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uprelay_core::config::AppConfig;
use uprelay_server::sessions::spawn_sweep_task;
use uprelay_server::{AppState, create_router};

/// uprelay - upload relay with live progress
#[derive(Parser, Debug)]
#[command(name = "uprelayd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "UPRELAY_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("uprelay v{}", env!("CARGO_PKG_VERSION"));

    // The file is optional; env vars can provide everything.
    let config_path = Path::new(&args.config);
    let config_file = if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        Some(config_path)
    } else {
        tracing::debug!("No config file found at {}", args.config);
        None
    };

    let config = AppConfig::load(config_file).context("failed to load configuration")?;

    uprelay_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let provider =
        uprelay_upstream::from_config(&config.provider).context("failed to initialize provider")?;
    tracing::info!(provider = provider.name(), "Storage provider initialized");

    let state = AppState::new(config.clone(), provider);

    let sweep_interval = config.sessions.sweep_interval();
    spawn_sweep_task(state.sessions.clone(), sweep_interval);
    tracing::info!(
        interval_secs = sweep_interval.as_secs(),
        ttl_secs = config.sessions.ttl_secs,
        "Session sweep task spawned"
    );

    let app = create_router(state);

    let addr = config
        .server
        .socket_addr()
        .context("invalid listen address")?;
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
