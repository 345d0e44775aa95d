//! Connection pool monitoring
//!
//! Instrumented transaction wrapper that logs how long a page waited for a
//! pooled connection and how long it held it. Up to `group_size` genres hold
//! a connection at once, so slow acquisition means the pool is undersized.

use openbook_common::{Error, Result};
use sqlx::{Connection, Sqlite, SqliteConnection, Transaction};
use std::time::Instant;

/// Transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    fn new(tx: Transaction<'c, Sqlite>, caller: &'static str) -> Self {
        Self {
            tx: Some(tx),
            caller,
            acquired_at: Instant::now(),
        }
    }

    /// Connection of the open transaction, usable as a sqlx executor
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(Error::Internal(format!(
                "{}: transaction already finished",
                self.caller
            ))),
        }
    }

    /// Open a nested transaction (SAVEPOINT) inside this one.
    ///
    /// Rolling the savepoint back discards only the work done through it.
    pub async fn savepoint(&mut self) -> Result<Transaction<'_, Sqlite>> {
        let conn = self.conn()?;
        Ok(conn.begin().await?)
    }

    /// Commit and log how long the connection was held
    pub async fn commit(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.commit().await?;
        self.log_release("commit");
        Ok(())
    }

    /// Roll back and log how long the connection was held
    pub async fn rollback(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.rollback().await?;
        self.log_release("rollback");
        Ok(())
    }

    fn take(&mut self) -> Result<Transaction<'c, Sqlite>> {
        self.tx.take().ok_or_else(|| {
            Error::Internal(format!("{}: transaction already finished", self.caller))
        })
    }

    fn log_release(&self, how: &'static str) {
        let held_ms = self.acquired_at.elapsed().as_millis() as u64;

        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms,
                how,
                "Long transaction, connection held for extended period"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms, how, "Connection released");
        }
    }
}

impl<'c> Drop for MonitoredTransaction<'c> {
    fn drop(&mut self) {
        // Still holding the transaction: sqlx rolls it back when it drops
        if self.tx.is_some() {
            tracing::debug!(
                caller = self.caller,
                held_ms = self.acquired_at.elapsed().as_millis() as u64,
                "Connection released (drop, implicit rollback)"
            );
        }
    }
}

/// Begin a monitored transaction on `pool`
///
/// ```ignore
/// let mut tx = begin_monitored(&pool, "batch_processor::persist_page").await?;
/// db::genres::upsert_genre(tx.conn()?, "fiction").await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();

    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis() as u64;
    if wait_ms > 1000 {
        tracing::warn!(
            caller,
            wait_ms,
            "Slow connection acquisition, pool may be saturated"
        );
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction::new(tx, caller))
}
