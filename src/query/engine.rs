//! Statement execution
//!
//! Runs a single statement and collects every row it produces. Statements
//! that produce no rows (DDL, DML) return empty `keys` and `data`.

use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use crate::record::Record;
use crate::value::Value;
use crate::Result;
use super::Params;

/// Column names plus row values, in statement order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub keys: Vec<String>,
    pub data: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// One record per row, keyed by column name
    pub fn into_records(self) -> Vec<Record> {
        let keys = self.keys;
        self.data
            .into_iter()
            .map(|row| keys.iter().cloned().zip(row).collect())
            .collect()
    }
}

/// Run one statement on `conn`
pub fn run_statement(conn: &Connection, sql: &str, params: &Params) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let keys: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = keys.len();

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut data = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(Value::from(row.get_ref(i)?));
        }
        data.push(values);
    }

    tracing::debug!(rows = data.len(), "ran statement: {}", sql);
    if width == 0 {
        return Ok(QueryResult::default());
    }
    Ok(QueryResult { keys, data })
}
