//! Synchronization statistics
//!
//! Per-genre and per-run results, serialized for the status endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a genre's loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenreOutcome {
    /// Quota reached
    Completed,
    /// Ran out of pages before the quota
    Exhausted,
    /// Too many consecutive page-level errors
    Failed,
}

impl GenreOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, GenreOutcome::Failed)
    }
}

/// Result of one page: fetched, normalized and persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStats {
    /// Raw records returned by the API
    pub received: usize,
    /// Records upserted and linked to the genre
    pub saved: usize,
    /// Records rejected by the normalizer or failing their own write
    pub skipped: usize,
    /// Links that did not exist before this page
    pub new_links: usize,
}

/// Final state of one genre's loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreReport {
    pub genre: String,
    pub outcome: GenreOutcome,
    /// Records saved across all pages
    pub processed: usize,
    pub skipped: usize,
    /// Pages attempted successfully (including empty ones)
    pub pages_fetched: usize,
    /// Offset the loop would have requested next
    pub next_offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Aggregate of one synchronization run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub total_processed: usize,
    pub genres: Vec<GenreReport>,
}

impl SyncReport {
    pub fn books_per_second(&self) -> f64 {
        if self.elapsed_ms == 0 {
            return self.total_processed as f64;
        }
        self.total_processed as f64 * 1000.0 / self.elapsed_ms as f64
    }

    pub fn failed_genres(&self) -> Vec<&str> {
        self.genres
            .iter()
            .filter(|g| g.outcome.is_failure())
            .map(|g| g.genre.as_str())
            .collect()
    }

    /// Report for `genre`, if it was part of the run
    pub fn genre(&self, genre: &str) -> Option<&GenreReport> {
        self.genres.iter().find(|g| g.genre == genre)
    }
}
