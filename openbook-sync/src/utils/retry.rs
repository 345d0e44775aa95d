//! Retry with exponential backoff
//!
//! Used for faults expected to clear on their own: network hiccups against
//! the catalog API and SQLite lock contention during page writes. Faults the
//! classifier rejects are returned immediately without consuming the budget.

use rand::Rng;
use std::time::{Duration, Instant};

/// Backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each following one
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(10),
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based), without jitter
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay with up to 20% random jitter added
    fn jittered_delay_for(&self, retry: u32) -> Duration {
        let delay = self.delay_for(retry);
        let jitter_ms = (delay.as_millis() as u64) / 5;
        if jitter_ms == 0 {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0..=jitter_ms);
        (delay + Duration::from_millis(extra)).min(self.max_delay)
    }
}

/// Run `operation`, retrying while `is_transient` accepts the error and the
/// retry budget lasts.
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "catalog fetch")
/// * `policy` - Retry budget and delays
/// * `is_transient` - Classifier; `false` fails immediately
/// * `operation` - Async closure performing one attempt
pub async fn retry_transient<F, Fut, T, E, C>(
    operation_name: &str,
    policy: &BackoffPolicy,
    is_transient: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: Fn(&E) -> bool,
{
    let start_time = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_transient(&err) {
                    return Err(err);
                }

                let retry = attempt;
                if retry > policy.max_retries {
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        error = %err,
                        "Retry budget exhausted"
                    );
                    return Err(err);
                }

                let delay = policy.jittered_delay_for(retry);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, will retry after backoff"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
