//! Storage Layer - SQLite-backed persistence
//!
//! One SQLite file holds:
//! - one table per name ever saved to, created and widened on demand
//! - swvariables(name, value_blob, type) for named variables
//! - _sw_runlog(run_id, time, success, exception_type) for the run log

pub mod schema;
pub mod sqlite;
pub mod transaction;
pub mod upsert;
pub mod variables;

pub use sqlite::{SqliteStore, TableStats};
pub use transaction::{FlushPolicy, RetryPolicy};
