//! Run log - one `_sw_runlog` row per invocation
//!
//! Rows are `(run_id, time, success, exception_type)`. The table is created
//! by the first recorded run, like any other saved table.

use uuid::Uuid;
use crate::record::Record;
use crate::storage::SqliteStore;
use crate::storage::schema::RUNLOG_TABLE;
use crate::value::{DATETIME_MICROS_FORMAT, Value};
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct RunLog {
    run_id: String,
}

impl RunLog {
    /// Start a run and hand back its log; the id is a fresh UUID v4
    pub fn setup() -> Self {
        let run_id = Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, "run started");
        Self { run_id }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Record the outcome: `None` for success, otherwise the failure's type name.
    ///
    /// The row is flushed immediately so it survives a process that exits
    /// right after.
    pub fn record(&self, store: &mut SqliteStore, exception_type: Option<&str>) -> Result<()> {
        let time = chrono::Local::now().naive_local().format(DATETIME_MICROS_FORMAT).to_string();
        let row = Record::new()
            .with("run_id", self.run_id.as_str())
            .with("time", time)
            .with("success", exception_type.is_none())
            .with("exception_type", exception_type.map(Value::from));

        store.save_into(RUNLOG_TABLE, &[], row)?;
        store.flush()?;
        match exception_type {
            None => tracing::info!(run_id = %self.run_id, "run succeeded"),
            Some(kind) => tracing::info!(run_id = %self.run_id, exception_type = kind, "run failed"),
        }
        Ok(())
    }

    /// Record the outcome of a finished run
    pub fn finish<T>(&self, store: &mut SqliteStore, outcome: &Result<T>) -> Result<()> {
        self.record(store, outcome.as_ref().err().map(Error::kind))
    }

    /// Run `f` as one logged run. The closure's result is passed through; a
    /// failure to write the log row itself is only logged.
    pub fn wrap<T>(store: &mut SqliteStore, f: impl FnOnce(&mut SqliteStore) -> Result<T>) -> Result<T> {
        let log = Self::setup();
        let outcome = f(store);
        if let Err(e) = log.finish(store, &outcome) {
            tracing::error!(run_id = %log.run_id, "failed to write run log: {}", e);
        }
        outcome
    }
}
