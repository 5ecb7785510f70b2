//! Connection pool monitoring utilities
//!
//! Instrumented transactions that log how long a pooled connection was
//! waited for and held, for diagnosing pool saturation under batch load.

use lexi_common::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::time::Instant;

/// Monitored transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    fn new(tx: Transaction<'c, Sqlite>, caller: &'static str, acquired_at: Instant) -> Self {
        Self {
            tx: Some(tx),
            caller,
            acquired_at,
        }
    }

    fn take(&mut self) -> Result<Transaction<'c, Sqlite>> {
        self.tx
            .take()
            .ok_or_else(|| Error::Internal(format!("{}: transaction already consumed", self.caller)))
    }

    /// Commit the transaction and log release timing
    pub async fn commit(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.commit().await?;

        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms = held_ms,
                "LONG TRANSACTION - Connection held for extended period, may contribute to pool saturation"
            );
        } else if held_ms > 1000 {
            tracing::info!(
                caller = self.caller,
                held_ms = held_ms,
                "Transaction held longer than expected (>1s)"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms = held_ms, "Connection released (commit)");
        }

        Ok(())
    }

    /// Rollback the transaction and log release timing
    pub async fn rollback(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.rollback().await?;

        tracing::debug!(
            caller = self.caller,
            held_ms = self.acquired_at.elapsed().as_millis(),
            "Connection released (rollback)"
        );

        Ok(())
    }

    /// Connection to run statements on inside this transaction
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(Error::Internal(format!(
                "{}: transaction already consumed",
                self.caller
            ))),
        }
    }
}

impl<'c> Drop for MonitoredTransaction<'c> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let held_ms = self.acquired_at.elapsed().as_millis();

            // Dropped without commit: sqlx rolls back, usually an error path
            if held_ms > 2000 {
                tracing::warn!(
                    caller = self.caller,
                    held_ms = held_ms,
                    "LONG TRANSACTION DROPPED - Connection held then released via Drop (error path?)"
                );
            } else {
                tracing::debug!(caller = self.caller, held_ms = held_ms, "Connection released (drop)");
            }
        }
    }
}

/// Begin a monitored transaction with connection pool timing logs
///
/// # Example
/// ```ignore
/// let mut tx = begin_monitored(&pool, "records::select").await?;
/// sqlx::query("...").execute(tx.conn()?).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c sqlx::SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();

    tracing::debug!(caller = caller, "Connection acquisition requested");

    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(
            caller = caller,
            wait_ms = wait_ms,
            "SLOW CONNECTION ACQUISITION - Pool may be saturated (all connections in use)"
        );
    } else {
        tracing::debug!(caller = caller, wait_ms = wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction::new(tx, caller, Instant::now()))
}
