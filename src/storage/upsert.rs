//! Upsert engine - turns record batches into INSERT / UPDATE statements
//!
//! Without a unique key every record is a new row. With one, an INSERT that
//! trips the unique index becomes an UPDATE replacing the existing row's
//! other columns.

use rusqlite::{Connection, ErrorCode, params_from_iter};
use crate::record::{Batch, Record};
use crate::value::{Value, infer};
use crate::{Error, Result};
use super::schema::{self, Column, quote_ident};

/// A validated batch bound for one table, with the column set it needs.
#[derive(Debug, Clone)]
pub struct SaveBatch {
    pub table: String,
    pub unique_keys: Vec<String>,
    pub columns: Vec<Column>,
    pub records: Vec<Record>,
}

impl SaveBatch {
    /// Check a batch's shape and infer its columns.
    ///
    /// Columns come out in first-seen order, followed by any unique-key
    /// columns no record mentions. A column whose values map to different
    /// storage types within the batch is a `RecordShape` error; nulls fit
    /// any column.
    pub fn prepare(table: &str, unique_keys: &[&str], batch: Batch) -> Result<Self> {
        let records = batch.into_records();
        let mut columns: Vec<Column> = Vec::new();

        for (i, record) in records.iter().enumerate() {
            if record.is_empty() {
                return Err(Error::RecordShape(format!("record {} has no columns", i)));
            }

            let mut seen: Vec<&str> = Vec::with_capacity(record.len());
            for (name, value) in record.iter() {
                if seen.iter().any(|s| s.eq_ignore_ascii_case(name)) {
                    return Err(Error::RecordShape(format!(
                        "record {} names column '{}' twice (column names are case-insensitive)",
                        i, name
                    )));
                }
                seen.push(name);

                let tag = infer(value);
                match columns.iter_mut().find(|c| c.name.eq_ignore_ascii_case(name)) {
                    Some(column) => match (column.tag, tag) {
                        (_, None) => {}
                        (None, Some(t)) => column.tag = Some(t),
                        (Some(a), Some(b)) if a != b => {
                            return Err(Error::RecordShape(format!(
                                "column '{}' holds {} values in one record and {} in another",
                                name, a, b
                            )));
                        }
                        _ => {}
                    },
                    None => columns.push(Column::new(name, tag)),
                }
            }
        }

        let mut keys: Vec<String> = Vec::with_capacity(unique_keys.len());
        for key in unique_keys {
            if keys.iter().any(|k| k.eq_ignore_ascii_case(key)) {
                return Err(Error::RecordShape(format!("unique key column '{}' listed twice", key)));
            }
            keys.push(key.to_string());
            if !columns.iter().any(|c| c.name.eq_ignore_ascii_case(key)) {
                columns.push(Column::new(*key, None));
            }
        }

        Ok(Self {
            table: table.to_string(),
            unique_keys: keys,
            columns,
            records,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Bring the table's schema up to date, then write every record.
///
/// Returns the number of records written.
pub fn apply(conn: &Connection, batch: &SaveBatch) -> Result<usize> {
    schema::ensure_table(conn, &batch.table, &batch.columns)?;
    schema::ensure_unique_key(conn, &batch.table, &batch.unique_keys)?;

    for record in &batch.records {
        upsert_record(conn, &batch.table, &batch.unique_keys, record)?;
    }
    tracing::debug!(table = %batch.table, records = batch.records.len(), "saved batch");
    Ok(batch.records.len())
}

fn upsert_record(conn: &Connection, table: &str, keys: &[String], record: &Record) -> Result<()> {
    let mut stmt = conn.prepare_cached(&insert_statement(table, record))?;
    match stmt.execute(params_from_iter(record.values())) {
        Ok(_) => Ok(()),
        Err(err) if !keys.is_empty() && is_unique_violation(&err) => {
            if update_existing(conn, table, keys, record)? {
                Ok(())
            } else {
                // The conflict came from some other unique index
                Err(err.into())
            }
        }
        Err(err) => Err(err.into()),
    }
}

static NULL: Value = Value::Null;

/// Replace the non-key columns of the row matching the record's key values.
///
/// Columns the record leaves out are set to NULL. Returns false if no row
/// matched.
fn update_existing(conn: &Connection, table: &str, keys: &[String], record: &Record) -> Result<bool> {
    let is_key = |name: &str| keys.iter().any(|k| k.eq_ignore_ascii_case(name));

    let columns = schema::table_columns(conn, table)?;
    let assignments: Vec<(&str, &Value)> = columns
        .iter()
        .filter(|c| !is_key(&c.name))
        .map(|c| (c.name.as_str(), record.get_ignore_case(&c.name).unwrap_or(&NULL)))
        .collect();
    let key_values: Vec<&Value> = keys
        .iter()
        .map(|k| record.get_ignore_case(k).unwrap_or(&NULL))
        .collect();

    let set_clause = if assignments.is_empty() {
        // Only key columns: the conflicting row already holds these values
        format!("{} = {}", quote_ident(&keys[0]), quote_ident(&keys[0]))
    } else {
        assignments
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("{} = ?{}", quote_ident(name), i + 1))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let where_clause = keys
        .iter()
        .enumerate()
        .map(|(i, k)| format!("{} IS ?{}", quote_ident(k), assignments.len() + i + 1))
        .collect::<Vec<_>>()
        .join(" AND ");

    let sql = format!("UPDATE {} SET {} WHERE {}", quote_ident(table), set_clause, where_clause);
    let params = assignments.iter().map(|(_, v)| *v).chain(key_values);
    let mut stmt = conn.prepare_cached(&sql)?;
    let updated = stmt.execute(params_from_iter(params))?;
    Ok(updated > 0)
}

fn insert_statement(table: &str, record: &Record) -> String {
    let columns: Vec<String> = record.columns().map(quote_ident).collect();
    let placeholders: Vec<String> = (1..=record.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}
