//! Catalog synchronization services
//!
//! Layering, bottom up: catalog client and normalizer, batch processor
//! (one page), genre loop (one genre), orchestrator (all genres), sync
//! runner (background runs).

pub mod batch_processor;
pub mod catalog_client;
pub mod genre_loop;
pub mod normalizer;
pub mod orchestrator;
pub mod statistics;
pub mod sync_runner;

pub use batch_processor::{BatchProcessor, SyncError};
pub use catalog_client::{CatalogClient, CatalogError, CatalogSource, RawAuthor, RawWork};
pub use genre_loop::{sync_genre, GenreSyncState, LoopLimits};
pub use normalizer::{NormalizedBook, RecordNormalizer, RejectReason};
pub use orchestrator::Orchestrator;
pub use statistics::{GenreOutcome, GenreReport, PageStats, SyncReport};
pub use sync_runner::{SyncRun, SyncTracker};
