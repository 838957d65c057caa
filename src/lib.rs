//! # Scrapestore - schema-inferring persistence for scraper output
//!
//! Hand it loosely-typed records and it keeps them in a single SQLite file.
//!
//! Scrapestore provides:
//! - Dynamic values with inferred storage types
//! - Lazy table creation and additive column migration
//! - Upserts against a per-table unique key
//! - Buffered writes with lock-contention retries and explicit transactions
//! - Ad-hoc queries returning ordered rows
//! - A named-variables table and a run log built on the same save primitive

pub mod value;
pub mod record;
pub mod storage;
pub mod query;
pub mod runlog;
pub mod status;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use value::{Value, TypeTag};
pub use record::{Record, Batch};
pub use storage::SqliteStore;
pub use query::{Params, QueryResult};
pub use runlog::RunLog;
pub use status::Status;
pub use config::StoreConfig;

/// Result type alias for Scrapestore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Scrapestore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Type mapping error: {0}")]
    TypeMapping(String),

    #[error("Schema conflict on table '{table}': unique key ({}) already declared, cannot declare ({})", existing.join(", "), requested.join(", "))]
    SchemaConflict {
        table: String,
        existing: Vec<String>,
        requested: Vec<String>,
    },

    #[error("Record shape error: {0}")]
    RecordShape(String),

    #[error("Database is locked (gave up after {attempts} attempts)")]
    StorageLocked { attempts: u32 },

    #[error("Query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Transaction error: {0}")]
    TransactionState(String),

    #[error("Invalid status: {0} (expected 'ok' or 'error')")]
    InvalidStatus(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable name of the error class, as recorded in the run log
    pub fn kind(&self) -> &'static str {
        match self {
            Error::TypeMapping(_) => "TypeMappingError",
            Error::SchemaConflict { .. } => "SchemaConflictError",
            Error::RecordShape(_) => "RecordShapeError",
            Error::StorageLocked { .. } => "StorageLockedError",
            Error::Query(_) => "QueryError",
            Error::TransactionState(_) => "TransactionStateError",
            Error::InvalidStatus(_) => "InvalidStatusError",
            Error::Io(_) => "IoError",
        }
    }

    /// True for the transient "database is locked" / "database is busy" failures
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Query(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
