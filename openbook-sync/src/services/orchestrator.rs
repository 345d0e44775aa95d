//! Sync orchestrator
//!
//! Splits the genre list into groups of `group_size`, runs the genres of a
//! group concurrently and waits for all of them before starting the next
//! group. A genre failure never stops its siblings or later groups.

use super::batch_processor::BatchProcessor;
use super::genre_loop::{sync_genre, LoopLimits};
use super::statistics::{GenreOutcome, GenreReport, SyncReport};
use chrono::{DateTime, Utc};
use openbook_common::SyncSettings;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use uuid::Uuid;

/// Runs one full synchronization across all configured genres
pub struct Orchestrator {
    processor: Arc<BatchProcessor>,
    genres: Vec<String>,
    group_size: usize,
    group_delay: Duration,
    limits: LoopLimits,
}

impl Orchestrator {
    pub fn new(processor: Arc<BatchProcessor>, settings: &SyncSettings) -> Self {
        Self {
            processor,
            genres: settings.genres.clone(),
            group_size: settings.group_size.max(1),
            group_delay: settings.group_delay(),
            limits: LoopLimits::from_settings(settings),
        }
    }

    pub fn genres(&self) -> &[String] {
        &self.genres
    }

    /// Run every group to completion and return the aggregate report.
    ///
    /// Per-genre outcomes are in the report; this never fails as a whole.
    pub async fn run(&self) -> SyncReport {
        self.run_with_id(Uuid::new_v4(), Utc::now()).await
    }

    /// Run under a caller-assigned id and start time
    pub async fn run_with_id(&self, run_id: Uuid, started_at: DateTime<Utc>) -> SyncReport {
        let start = Instant::now();

        tracing::info!(
            %run_id,
            genres = self.genres.len(),
            group_size = self.group_size,
            quota = self.limits.quota,
            "Starting catalog synchronization"
        );

        let groups: Vec<&[String]> = self.genres.chunks(self.group_size).collect();
        let group_count = groups.len();
        let mut reports = Vec::with_capacity(self.genres.len());

        for (index, group) in groups.into_iter().enumerate() {
            tracing::info!(
                %run_id,
                group = index + 1,
                of = group_count,
                genres = ?group,
                "Starting genre group"
            );

            let group_reports = self.run_group(group).await;
            let group_total: usize = group_reports.iter().map(|r| r.processed).sum();

            tracing::info!(
                %run_id,
                group = index + 1,
                processed = group_total,
                "Genre group finished"
            );

            reports.extend(group_reports);

            if index + 1 < group_count && !self.group_delay.is_zero() {
                tokio::time::sleep(self.group_delay).await;
            }
        }

        let elapsed = start.elapsed();
        let report = SyncReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            elapsed_ms: elapsed.as_millis() as u64,
            total_processed: reports.iter().map(|r| r.processed).sum(),
            genres: reports,
        };

        tracing::info!(
            %run_id,
            total_processed = report.total_processed,
            elapsed_secs = elapsed.as_secs_f64(),
            books_per_second = report.books_per_second(),
            failed = ?report.failed_genres(),
            "Catalog synchronization finished"
        );

        report
    }

    /// Run the genres of one group concurrently; reports keep group order
    async fn run_group(&self, group: &[String]) -> Vec<GenreReport> {
        let mut tasks = JoinSet::new();

        for (slot, genre) in group.iter().enumerate() {
            let processor = Arc::clone(&self.processor);
            let limits = self.limits.clone();
            let genre = genre.clone();
            tasks.spawn(async move { (slot, sync_genre(&processor, &genre, &limits).await) });
        }

        let mut slots: Vec<Option<GenreReport>> = vec![None; group.len()];

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, report)) => slots[slot] = Some(report),
                Err(e) => {
                    // The slot of a panicked task stays empty and is filled below
                    tracing::error!(error = %e, "Genre task aborted");
                }
            }
        }

        slots
            .into_iter()
            .zip(group)
            .map(|(report, genre)| report.unwrap_or_else(|| aborted_report(genre)))
            .collect()
    }
}

fn aborted_report(genre: &str) -> GenreReport {
    GenreReport {
        genre: genre.to_string(),
        outcome: GenreOutcome::Failed,
        processed: 0,
        skipped: 0,
        pages_fetched: 0,
        next_offset: 0,
        last_error: Some("genre task aborted".to_string()),
    }
}
