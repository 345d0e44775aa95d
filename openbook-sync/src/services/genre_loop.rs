//! Genre completion loop
//!
//! Drives the batch processor for one genre, page after page, until the
//! quota is reached, the catalog runs dry, or page-level errors pile up.
//!
//! # Transitions (state: FETCHING)
//! - page saved records: add to processed, advance offset, reset both
//!   streaks; finish as `Completed` once processed >= quota
//! - page saved nothing: empty streak +1, advance offset; finish as
//!   `Exhausted` once the streak hits its threshold
//! - page-level error: error streak +1, keep offset; finish as `Failed` once
//!   the streak hits its threshold
//!
//! The offset always advances by the full page size, however many records
//! of the page were valid.

use super::batch_processor::{BatchProcessor, SyncError};
use super::statistics::{GenreOutcome, GenreReport, PageStats};
use openbook_common::SyncSettings;
use std::time::Duration;

/// Loop parameters for one genre
#[derive(Debug, Clone)]
pub struct LoopLimits {
    pub quota: usize,
    pub page_size: usize,
    pub max_consecutive_errors: u32,
    pub max_consecutive_empty_pages: u32,
    pub page_delay: Duration,
    pub empty_page_delay: Duration,
    pub error_backoff: Duration,
}

impl LoopLimits {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            quota: settings.quota_per_genre,
            page_size: settings.page_size,
            max_consecutive_errors: settings.max_consecutive_errors,
            max_consecutive_empty_pages: settings.max_consecutive_empty_pages,
            page_delay: settings.page_delay(),
            empty_page_delay: settings.empty_page_delay(),
            error_backoff: settings.error_backoff(),
        }
    }
}

/// What the loop does next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Wait, then fetch the page at the current offset
    Continue(Duration),
    /// Stop with this outcome
    Finish(GenreOutcome),
}

/// Per-genre progress, owned by one loop invocation and discarded after it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenreSyncState {
    pub offset: usize,
    pub processed: usize,
    pub skipped: usize,
    pub pages_fetched: usize,
    pub consecutive_errors: u32,
    pub consecutive_empty_pages: u32,
    pub last_error: Option<String>,
}

impl GenreSyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a successfully processed page
    pub fn record_page(&mut self, page: &PageStats, limits: &LoopLimits) -> Step {
        self.pages_fetched += 1;
        self.skipped += page.skipped;
        self.offset += limits.page_size;
        self.consecutive_errors = 0;

        if page.saved > 0 {
            self.processed += page.saved;
            self.consecutive_empty_pages = 0;

            if self.processed >= limits.quota {
                Step::Finish(GenreOutcome::Completed)
            } else {
                Step::Continue(limits.page_delay)
            }
        } else {
            self.consecutive_empty_pages += 1;

            if self.consecutive_empty_pages >= limits.max_consecutive_empty_pages {
                Step::Finish(GenreOutcome::Exhausted)
            } else {
                Step::Continue(limits.empty_page_delay)
            }
        }
    }

    /// Apply a page-level error; the offset is kept so the page is retried
    pub fn record_error(&mut self, error: &SyncError, limits: &LoopLimits) -> Step {
        self.consecutive_errors += 1;
        self.last_error = Some(error.to_string());

        if self.consecutive_errors >= limits.max_consecutive_errors {
            Step::Finish(GenreOutcome::Failed)
        } else {
            Step::Continue(limits.error_backoff)
        }
    }

    fn into_report(self, genre: &str, outcome: GenreOutcome) -> GenreReport {
        GenreReport {
            genre: genre.to_string(),
            outcome,
            processed: self.processed,
            skipped: self.skipped,
            pages_fetched: self.pages_fetched,
            next_offset: self.offset,
            last_error: self.last_error,
        }
    }
}

/// Run one genre to completion. Never returns an error: failure is an
/// outcome in the report.
pub async fn sync_genre(processor: &BatchProcessor, genre: &str, limits: &LoopLimits) -> GenreReport {
    tracing::info!(genre, quota = limits.quota, "Starting genre synchronization");

    let mut state = GenreSyncState::new();

    let outcome = loop {
        let step = match processor.process_page(genre, state.offset).await {
            Ok(page) => {
                let step = state.record_page(&page, limits);
                tracing::info!(
                    genre,
                    processed = state.processed,
                    quota = limits.quota,
                    next_offset = state.offset,
                    "Genre progress"
                );
                step
            }
            Err(err) => {
                let step = state.record_error(&err, limits);
                tracing::warn!(
                    genre,
                    offset = state.offset,
                    attempt = state.consecutive_errors,
                    max = limits.max_consecutive_errors,
                    error = %err,
                    "Page failed"
                );
                step
            }
        };

        match step {
            Step::Continue(delay) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Step::Finish(outcome) => break outcome,
        }
    };

    match outcome {
        GenreOutcome::Failed => tracing::error!(
            genre,
            processed = state.processed,
            errors = state.consecutive_errors,
            "Genre failed after consecutive errors"
        ),
        GenreOutcome::Exhausted => tracing::info!(
            genre,
            processed = state.processed,
            quota = limits.quota,
            "Genre exhausted before quota"
        ),
        GenreOutcome::Completed => tracing::info!(
            genre,
            processed = state.processed,
            "Genre completed"
        ),
    }

    state.into_report(genre, outcome)
}
