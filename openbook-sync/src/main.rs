//! openbook-sync - Catalog synchronization service
//!
//! Populates the local book catalog from a public subject-search API and
//! exposes health and sync-control endpoints. When the catalog is empty at
//! startup, a full synchronization runs in the background.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use openbook_common::ServiceConfig;
use openbook_sync::services::CatalogClient;
use openbook_sync::AppState;

/// Command-line arguments for openbook-sync
#[derive(Parser, Debug)]
#[command(name = "openbook-sync")]
#[command(about = "Book catalog synchronization service")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "OPENBOOK_CONFIG")]
    config: Option<PathBuf>,

    /// Skip the startup synchronization even if the catalog is empty
    #[arg(long)]
    no_startup_sync: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "openbook_sync=info,openbook_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting openbook-sync v{}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    info!(
        api = %config.sync.api_base_url,
        genres = ?config.sync.genres,
        quota = config.sync.quota_per_genre,
        group_size = config.sync.group_size,
        "Synchronization settings"
    );

    let db_pool = openbook_common::db::init_database(&config.database_path, config.max_connections)
        .await
        .context("Failed to initialize database")?;
    info!("Database: {}", config.database_path.display());

    let client = CatalogClient::from_settings(&config.sync).context("Failed to build catalog client")?;
    let state = AppState::new(db_pool, Arc::new(client), &config.sync);

    if config.sync_on_startup && !args.no_startup_sync {
        if let Err(e) = state.sync_if_empty().await {
            error!(error = %e, "Startup synchronization check failed");
        }
    }

    let app = openbook_sync::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.listen_addr))?;
    info!("Listening on http://{}", config.listen_addr);
    info!("Health check: http://{}/health", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
