//! Transaction coordination - write buffering, flush policy, lock retries
//!
//! Outside an explicit transaction, saves are queued in a [`WriteBuffer`] and
//! committed together as one `BEGIN IMMEDIATE ... COMMIT` unit. When another
//! process holds the database lock, the whole unit is retried under a
//! [`RetryPolicy`] with capped exponential backoff.

use std::time::{Duration, Instant};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use crate::{Error, Result};
use super::upsert::SaveBatch;

/// Bounded retry for "database is locked" failures.
///
/// With the defaults a batch is tried 5 times, sleeping 25, 50, 100 and 200 ms
/// in between (375 ms total).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 25,
            max_backoff_ms: 400,
        }
    }
}

impl RetryPolicy {
    /// Sleep before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        let ms = self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Run `op` until it succeeds, fails with a non-lock error, or the budget runs out.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_lock_contention() => {
                    if attempt >= attempts {
                        tracing::warn!(attempts, "database still locked, giving up");
                        return Err(Error::StorageLocked { attempts });
                    }
                    let delay = self.backoff(attempt);
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "database is locked, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// When queued writes are committed without an explicit `flush`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushPolicy {
    /// Flush once this many records are queued
    pub max_pending: usize,
    /// Flush once the oldest queued write is this old
    pub max_age_ms: u64,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_pending: 1000,
            max_age_ms: 5000,
        }
    }
}

impl FlushPolicy {
    pub fn is_due(&self, pending: usize, oldest: Option<Instant>) -> bool {
        if pending == 0 {
            return false;
        }
        if pending >= self.max_pending {
            return true;
        }
        oldest.is_some_and(|since| since.elapsed() >= Duration::from_millis(self.max_age_ms))
    }
}

/// Saves waiting to be committed
#[derive(Debug, Default)]
pub(crate) struct WriteBuffer {
    batches: Vec<SaveBatch>,
    records: usize,
    since: Option<Instant>,
}

impl WriteBuffer {
    pub fn push(&mut self, batch: SaveBatch) {
        self.records += batch.records.len();
        self.since.get_or_insert_with(Instant::now);
        self.batches.push(batch);
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn pending_records(&self) -> usize {
        self.records
    }

    pub fn oldest(&self) -> Option<Instant> {
        self.since
    }

    /// Most recent unique key queued for a table
    pub fn unique_key_for(&self, table: &str) -> Option<&[String]> {
        self.batches
            .iter()
            .rev()
            .find(|b| b.table.eq_ignore_ascii_case(table) && !b.unique_keys.is_empty())
            .map(|b| b.unique_keys.as_slice())
    }

    pub fn take(&mut self) -> Vec<SaveBatch> {
        self.records = 0;
        self.since = None;
        std::mem::take(&mut self.batches)
    }

    /// Put batches back in front of anything queued since they were taken
    pub fn restore(&mut self, mut batches: Vec<SaveBatch>) {
        let queued = self.take();
        batches.extend(queued);
        for batch in batches {
            self.push(batch);
        }
    }
}

/// Run `f` as one `BEGIN IMMEDIATE ... COMMIT` unit, rolling back on error.
pub(crate) fn in_transaction<T>(conn: &Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = f(conn).and_then(|value| {
        conn.execute_batch("COMMIT")?;
        Ok(value)
    });
    if result.is_err() {
        rollback_quietly(conn);
    }
    result
}

/// Run `f` inside a savepoint so a failed save leaves no partial schema or rows.
pub(crate) fn with_savepoint<T>(conn: &Connection, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
    conn.execute_batch("SAVEPOINT scrapestore_save")?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch("RELEASE scrapestore_save")?;
            Ok(value)
        }
        Err(err) => {
            conn.execute_batch("ROLLBACK TO scrapestore_save; RELEASE scrapestore_save")?;
            Err(err)
        }
    }
}

/// Roll back whatever transaction is open, logging failures
pub(crate) fn rollback_quietly(conn: &Connection) {
    if conn.is_autocommit() {
        return;
    }
    if let Err(e) = conn.execute_batch("ROLLBACK") {
        tracing::warn!("rollback failed: {}", e);
    }
}

/// Apply queued batches in order; returns the number of records written
pub(crate) fn apply_all(conn: &Connection, batches: &[SaveBatch]) -> Result<usize> {
    let mut written = 0;
    for batch in batches {
        written += super::upsert::apply(conn, batch)?;
    }
    Ok(written)
}
