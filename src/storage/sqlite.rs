//! SQLite storage implementation

use std::path::Path;
use std::time::Duration;
use rusqlite::Connection;
use crate::config::StoreConfig;
use crate::query::{self, Params, QueryResult};
use crate::record::{Batch, Record};
use crate::{Error, Result};
use super::schema::{self, Column};
use super::transaction::{self, FlushPolicy, RetryPolicy, WriteBuffer};
use super::upsert::{self, SaveBatch};

/// Handle on a scrapestore database file.
///
/// Saves outside an explicit transaction are queued and committed in batches;
/// any read flushes them first. Dropping the store flushes whatever is still
/// queued and rolls back an uncommitted explicit transaction.
pub struct SqliteStore {
    conn: Connection,
    default_table: String,
    retry: RetryPolicy,
    flush: FlushPolicy,
    buffer: WriteBuffer,
    in_scope: bool,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &StoreConfig::default())
    }

    /// Open a database file with explicit retry/flush settings
    pub fn open_with(path: &Path, config: &StoreConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened store");
        Self::from_connection(conn, config)
    }

    /// Open the database named by a config
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        Self::open_with(&config.database, config)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, &StoreConfig::default())
    }

    fn from_connection(conn: Connection, config: &StoreConfig) -> Result<Self> {
        // Contention is handled by the retry policy, not by blocking in SQLite
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Ok(Self {
            conn,
            default_table: config.default_table.clone(),
            retry: config.retry,
            flush: config.flush,
            buffer: WriteBuffer::default(),
            in_scope: false,
        })
    }

    /// Underlying connection, for callers that need raw access
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    // ========== Save Operations ==========

    /// Table used by `save` when none is named
    pub fn default_table(&self) -> &str {
        &self.default_table
    }

    /// Change the table used by subsequent `save` calls on this handle
    pub fn set_table(&mut self, table: impl Into<String>) {
        self.default_table = table.into();
    }

    /// Save one record or a batch into the default table.
    ///
    /// With an empty `unique_keys` every record becomes a new row; otherwise
    /// records matching an existing row on those columns update it.
    pub fn save(&mut self, unique_keys: &[&str], records: impl Into<Batch>) -> Result<()> {
        let table = self.default_table.clone();
        self.save_into(&table, unique_keys, records)
    }

    /// Save one record or a batch into a named table
    pub fn save_into(&mut self, table: &str, unique_keys: &[&str], records: impl Into<Batch>) -> Result<()> {
        let batch = SaveBatch::prepare(table, unique_keys, records.into())?;
        self.save_batch(batch)
    }

    /// Queue (or, inside an explicit transaction, write) a prepared batch
    pub(crate) fn save_batch(&mut self, batch: SaveBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.check_unique_key(&batch)?;

        if self.in_scope {
            transaction::with_savepoint(&self.conn, |conn| upsert::apply(conn, &batch))?;
            return Ok(());
        }

        self.buffer.push(batch);
        if self.flush.is_due(self.buffer.pending_records(), self.buffer.oldest()) {
            self.flush()?;
        }
        Ok(())
    }

    /// Reject a unique key that differs from the one already declared or queued
    fn check_unique_key(&self, batch: &SaveBatch) -> Result<()> {
        if batch.unique_keys.is_empty() {
            return Ok(());
        }
        let declared = match self.buffer.unique_key_for(&batch.table) {
            Some(queued) => Some(queued.to_vec()),
            None => {
                let conn = &self.conn;
                self.retry.run(|| schema::unique_key(conn, &batch.table))?
            }
        };
        match declared {
            Some(existing) if !schema::same_key(&existing, &batch.unique_keys) => Err(Error::SchemaConflict {
                table: batch.table.clone(),
                existing,
                requested: batch.unique_keys.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Number of records queued and not yet committed
    pub fn pending_records(&self) -> usize {
        self.buffer.pending_records()
    }

    // ========== Transaction Operations ==========

    /// Commit queued writes now, as one transaction.
    ///
    /// A batch that fails on lock contention stays queued for the next flush;
    /// any other failure discards the queued writes.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batches = self.buffer.take();
        let conn = &self.conn;
        let result = self
            .retry
            .run(|| transaction::in_transaction(conn, |conn| transaction::apply_all(conn, &batches)));

        match result {
            Ok(written) => {
                tracing::debug!(records = written, batches = batches.len(), "flushed pending writes");
                Ok(())
            }
            Err(err @ Error::StorageLocked { .. }) => {
                self.buffer.restore(batches);
                Err(err)
            }
            Err(err) => {
                let dropped: usize = batches.iter().map(|b| b.records.len()).sum();
                tracing::warn!(records = dropped, "discarding pending writes after failed flush: {}", err);
                Err(err)
            }
        }
    }

    /// Is an explicit transaction open?
    pub fn in_transaction(&self) -> bool {
        self.in_scope
    }

    /// Begin an explicit transaction.
    ///
    /// Queued writes are flushed first. Until `commit`/`rollback`, saves are
    /// written straight into the open transaction.
    pub fn begin(&mut self) -> Result<()> {
        if self.in_scope {
            return Err(Error::TransactionState("a transaction is already active".to_string()));
        }
        self.flush()?;
        let conn = &self.conn;
        self.retry.run(|| Ok(conn.execute_batch("BEGIN IMMEDIATE")?))?;
        self.in_scope = true;
        Ok(())
    }

    /// Commit the explicit transaction; on failure it is rolled back
    pub fn commit(&mut self) -> Result<()> {
        if !self.in_scope {
            return Err(Error::TransactionState("no active transaction to commit".to_string()));
        }
        self.in_scope = false;
        let conn = &self.conn;
        let result = self.retry.run(|| Ok(conn.execute_batch("COMMIT")?));
        if result.is_err() {
            transaction::rollback_quietly(conn);
        }
        result
    }

    /// Roll back the explicit transaction
    pub fn rollback(&mut self) -> Result<()> {
        if !self.in_scope {
            return Err(Error::TransactionState("no active transaction to roll back".to_string()));
        }
        self.in_scope = false;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    /// Run `f` in an explicit transaction: commit if it returns `Ok`, roll back if not.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                if self.in_scope {
                    self.commit()?;
                }
                Ok(value)
            }
            Err(err) => {
                if self.in_scope {
                    if let Err(rb) = self.rollback() {
                        tracing::warn!("rollback after failed transaction also failed: {}", rb);
                    }
                }
                Err(err)
            }
        }
    }

    /// Flush and close, reporting any error `Drop` would only log
    pub fn close(mut self) -> Result<()> {
        if self.in_scope {
            tracing::warn!("closing store with an open transaction; rolling back");
            self.rollback()?;
        }
        self.flush()
    }

    // ========== Query Operations ==========

    /// Run one statement with positional parameters.
    ///
    /// Queued writes are flushed first so reads see this handle's own saves.
    pub fn execute(&mut self, sql: &str, params: impl Into<Params>) -> Result<QueryResult> {
        self.flush()?;
        let params = params.into();
        if self.in_scope {
            return query::run_statement(&self.conn, sql, &params);
        }
        let conn = &self.conn;
        self.retry.run(|| query::run_statement(conn, sql, &params))
    }

    /// `SELECT <fragment>`, returning each row as a record
    pub fn select(&mut self, fragment: &str, params: impl Into<Params>) -> Result<Vec<Record>> {
        let result = self.execute(&format!("SELECT {}", fragment), params)?;
        Ok(result.into_records())
    }

    /// Per-table statistics
    pub fn stats(&mut self) -> Result<Vec<TableStats>> {
        self.flush()?;
        let conn = &self.conn;
        self.retry.run(|| table_stats(conn))
    }
}

fn table_stats(conn: &Connection) -> Result<Vec<TableStats>> {
    let mut stats = Vec::new();
    for table in schema::list_tables(conn)? {
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", schema::quote_ident(&table)),
            [],
            |row| row.get(0),
        )?;
        let columns = schema::table_columns(conn, &table)?;
        let unique_key = schema::unique_key(conn, &table)?;
        stats.push(TableStats {
            name: table,
            rows: count as usize,
            columns,
            unique_key,
        });
    }
    Ok(stats)
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if self.in_scope {
            tracing::warn!("store dropped with an open transaction; rolling back");
            self.in_scope = false;
            transaction::rollback_quietly(&self.conn);
        }
        if let Err(e) = self.flush() {
            tracing::error!("failed to flush pending writes on close: {}", e);
        }
    }
}

/// Table statistics
#[derive(Debug, Clone)]
pub struct TableStats {
    pub name: String,
    pub rows: usize,
    pub columns: Vec<Column>,
    pub unique_key: Option<Vec<String>>,
}

impl std::fmt::Display for TableStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Table {}:", self.name)?;
        writeln!(f, "  Rows: {}", self.rows)?;
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| match c.tag {
                Some(tag) => format!("{} {}", c.name, tag),
                None => c.name.clone(),
            })
            .collect();
        writeln!(f, "  Columns: {}", columns.join(", "))?;
        match &self.unique_key {
            Some(keys) => writeln!(f, "  Unique key: ({})", keys.join(", ")),
            None => writeln!(f, "  Unique key: none"),
        }
    }
}
