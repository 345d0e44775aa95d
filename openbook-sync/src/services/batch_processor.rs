//! Batch processor: one genre, one page
//!
//! Fetches a page of raw works and persists it inside a single transaction:
//! genre tag first, then each record on its own savepoint so a bad record
//! only discards its own writes. Page-level faults (connection, begin,
//! genre upsert, commit) roll back the whole page and propagate.
//!
//! The write throttle runs after commit, never while a connection is held.

use super::catalog_client::{CatalogError, CatalogSource, RawWork};
use super::normalizer::{NormalizedBook, RecordNormalizer};
use super::statistics::PageStats;
use crate::db;
use crate::utils::{begin_monitored, retry_transient, BackoffPolicy, MonitoredTransaction};
use openbook_common::{Error, SyncSettings};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Page-level synchronization fault
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("catalog fetch failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("page write failed: {0}")]
    Store(#[from] Error),
}

/// Outcome of writing one normalized record inside the page transaction
enum RecordWrite {
    Saved { new_link: bool },
    Failed(Error),
}

/// Fetches and persists pages for a genre
pub struct BatchProcessor {
    pool: SqlitePool,
    source: Arc<dyn CatalogSource>,
    normalizer: RecordNormalizer,
    page_size: usize,
    write_pause: Duration,
    write_pause_every: usize,
    lock_retry: BackoffPolicy,
}

impl BatchProcessor {
    pub fn new(pool: SqlitePool, source: Arc<dyn CatalogSource>, settings: &SyncSettings) -> Self {
        Self {
            pool,
            source,
            normalizer: RecordNormalizer::new(settings.cover_url_template.clone()),
            page_size: settings.page_size,
            write_pause: settings.write_pause(),
            write_pause_every: settings.write_pause_every.max(1),
            lock_retry: BackoffPolicy::new(3, Duration::from_millis(50)),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch the page at `offset` and persist it.
    ///
    /// An empty page returns zeroed stats without touching the database.
    pub async fn process_page(&self, genre: &str, offset: usize) -> Result<PageStats, SyncError> {
        let works = self.source.fetch_page(genre, self.page_size, offset).await?;

        if works.is_empty() {
            tracing::info!(genre, offset, "No more works at this offset");
            return Ok(PageStats::default());
        }

        let stats = retry_transient(
            "page persist",
            &self.lock_retry,
            Error::is_lock_contention,
            || self.persist_page(genre, &works, offset),
        )
        .await?;

        self.pace_writes(stats.saved).await;

        Ok(stats)
    }

    /// Persist already-fetched works for `genre` in one transaction.
    ///
    /// `offset` is only used for logging.
    pub async fn persist_page(
        &self,
        genre: &str,
        works: &[RawWork],
        offset: usize,
    ) -> Result<PageStats, Error> {
        if works.is_empty() {
            return Ok(PageStats::default());
        }

        let mut tx = begin_monitored(&self.pool, "batch_processor::persist_page").await?;

        match self.write_records(&mut tx, genre, works, offset).await {
            Ok(stats) => {
                tx.commit().await?;
                tracing::info!(
                    genre,
                    offset,
                    saved = stats.saved,
                    skipped = stats.skipped,
                    new_links = stats.new_links,
                    "Page committed"
                );
                Ok(stats)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(genre, offset, error = %rollback_err, "Rollback failed");
                }
                tracing::error!(genre, offset, error = %err, "Page rolled back");
                Err(err)
            }
        }
    }

    async fn write_records(
        &self,
        tx: &mut MonitoredTransaction<'_>,
        genre: &str,
        works: &[RawWork],
        offset: usize,
    ) -> Result<PageStats, Error> {
        let genre_id = db::upsert_genre(tx.conn()?, genre).await?;

        let mut stats = PageStats {
            received: works.len(),
            ..PageStats::default()
        };

        for raw in works {
            let book = match self.normalizer.normalize(raw) {
                Ok(book) => book,
                Err(reason) => {
                    stats.skipped += 1;
                    tracing::debug!(
                        genre,
                        offset,
                        title = raw.title.as_deref().unwrap_or("<untitled>"),
                        reason = %reason,
                        "Work skipped"
                    );
                    continue;
                }
            };

            match write_record(tx, &book, genre_id).await? {
                RecordWrite::Saved { new_link } => {
                    stats.saved += 1;
                    if new_link {
                        stats.new_links += 1;
                    }
                }
                RecordWrite::Failed(err) => {
                    stats.skipped += 1;
                    tracing::warn!(
                        genre,
                        offset,
                        key = %book.external_key,
                        title = %book.title,
                        error = %err,
                        "Work write failed, skipped"
                    );
                }
            }
        }

        Ok(stats)
    }

    /// Sleep `write_pause` for every `write_pause_every` saved records
    async fn pace_writes(&self, saved: usize) {
        let pauses = (saved / self.write_pause_every) as u32;
        if pauses == 0 || self.write_pause.is_zero() {
            return;
        }
        tokio::time::sleep(self.write_pause * pauses).await;
    }
}

/// Upsert one book and link it, on its own savepoint.
///
/// The outer `Err` is a page-level fault (savepoint could not be opened or
/// closed); a failed write inside the savepoint is reported as
/// `RecordWrite::Failed`.
async fn write_record(
    tx: &mut MonitoredTransaction<'_>,
    book: &NormalizedBook,
    genre_id: i64,
) -> Result<RecordWrite, Error> {
    let mut savepoint = tx.savepoint().await?;

    let written = async {
        let book_id = db::upsert_book(&mut savepoint, book).await?;
        db::link_book_to_genre(&mut savepoint, book_id, genre_id).await
    }
    .await;

    match written {
        Ok(new_link) => {
            savepoint.commit().await?;
            Ok(RecordWrite::Saved { new_link })
        }
        Err(err) => {
            savepoint.rollback().await?;
            Ok(RecordWrite::Failed(err))
        }
    }
}
