//! Background synchronization runs
//!
//! At most one run is active per process. A run is started on a spawned
//! task; its report replaces the previous one when it finishes.

use super::orchestrator::Orchestrator;
use super::statistics::SyncReport;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Tracks the active run and the last finished report
#[derive(Clone, Default)]
pub struct SyncTracker {
    running: Arc<AtomicBool>,
    last_report: Arc<RwLock<Option<SyncReport>>>,
}

/// Handle to a run that has just been started
pub struct SyncRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub handle: JoinHandle<()>,
}

/// Clears the running flag when the run task ends, including by panic
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn last_report(&self) -> Option<SyncReport> {
        self.last_report.read().await.clone()
    }

    /// Spawn a run unless one is already active.
    ///
    /// Returns `None` when another run holds the slot.
    pub fn start(&self, orchestrator: Arc<Orchestrator>) -> Option<SyncRun> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let guard = RunningGuard(Arc::clone(&self.running));
        let last_report = Arc::clone(&self.last_report);

        let handle = tokio::spawn(async move {
            let _guard = guard;
            tracing::info!(%run_id, "Background synchronization task started");

            let report = orchestrator.run_with_id(run_id, started_at).await;
            *last_report.write().await = Some(report);

            tracing::info!(%run_id, "Background synchronization task completed");
        });

        Some(SyncRun {
            run_id,
            started_at,
            handle,
        })
    }
}
