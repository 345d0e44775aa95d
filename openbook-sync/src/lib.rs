//! openbook-sync library interface
//!
//! Catalog synchronization engine plus the small HTTP surface that exposes
//! it. Exposed as a library so integration tests can drive it directly.

pub mod api;
pub mod db;
pub mod error;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use openbook_common::SyncSettings;
use services::{BatchProcessor, CatalogSource, Orchestrator, SyncRun, SyncTracker};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Runs full synchronizations against the configured catalog source
    pub orchestrator: Arc<Orchestrator>,
    /// Active run flag and last report
    pub sync: SyncTracker,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, source: Arc<dyn CatalogSource>, settings: &SyncSettings) -> Self {
        let processor = Arc::new(BatchProcessor::new(db.clone(), source, settings));
        Self {
            orchestrator: Arc::new(Orchestrator::new(processor, settings)),
            db,
            sync: SyncTracker::new(),
            startup_time: Utc::now(),
        }
    }

    /// Start a background run unless one is already active
    pub fn start_sync(&self) -> Option<SyncRun> {
        self.sync.start(Arc::clone(&self.orchestrator))
    }

    /// Start a background run if the catalog holds no books yet
    pub async fn sync_if_empty(&self) -> openbook_common::Result<Option<SyncRun>> {
        let book_count = db::books::count_books(&self.db).await?;
        if book_count > 0 {
            tracing::info!(book_count, "Catalog already populated, skipping startup sync");
            return Ok(None);
        }

        tracing::info!("Catalog is empty, starting initial synchronization");
        Ok(self.start_sync())
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::sync_routes())
        .with_state(state)
}
