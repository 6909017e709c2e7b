//! registry-auth-shim - Docker Registry v2 token auth in front of a Basic-auth registry
//!
//! This is the main entry point for the registry-auth-shim application.

use clap::Parser;
use tokio::signal;
use tracing::info;

use registry_auth_shim::config::Config;
use registry_auth_shim::error::AppError;
use registry_auth_shim::server::{AppState, Server};
use registry_auth_shim::telemetry::init_tracing;

/// registry-auth-shim - Docker Registry v2 token auth in front of a Basic-auth registry
#[derive(Parser, Debug)]
#[command(name = "registry-auth-shim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "AUTH_SHIM_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load and validate configuration
    let config = load_config(&args)?;

    // Initialize tracing/logging
    init_tracing(&config.logging).map_err(AppError::from)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting registry-auth-shim"
    );

    let state = AppState::from_config(&config).map_err(AppError::from)?;
    info!(
        upstream = %config.upstream.url,
        realm = %state.realm,
        token_ttl_secs = config.auth.token_ttl_secs,
        kdf = ?config.auth.kdf.params(),
        "Token authentication initialized"
    );

    // Create and start the HTTP server
    let server = Server::new(config.server.clone(), config.cors.clone(), state);

    info!(
        host = %config.server.host,
        port = %config.server.port,
        "Starting HTTP server"
    );

    let result = server.run(shutdown_signal()).await;

    info!("registry-auth-shim shutdown complete");

    result.map_err(|e| AppError::from(e).into())
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let config = match &args.config {
        Some(path) => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path)
        }
        None => {
            // Use eprintln! since tracing is not yet initialized
            eprintln!("Loading configuration from environment variables");
            Config::from_env()
        }
    }
    .map_err(AppError::from)?;

    config.validate().map_err(AppError::from)?;
    Ok(config)
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
