//! Named variables - a key/value table built on the save primitive
//!
//! Each variable is one row of `swvariables(name, value_blob, type)`, keyed
//! on `name`. The `type` column records the value's kind so `get_var` can
//! hand back exactly what was saved.

use rusqlite::{Connection, OptionalExtension};
use rusqlite::types::Value as SqlValue;
use crate::record::{Batch, Record};
use crate::value::{self, TypeTag, Value};
use crate::{Error, Result};
use super::schema::{self, Column, VARIABLES_TABLE};
use super::sqlite::SqliteStore;
use super::upsert::SaveBatch;

/// Fixed column layout; `value_blob` holds values of every kind
fn variable_columns() -> Vec<Column> {
    vec![
        Column::new("name", Some(TypeTag::Text)),
        Column::new("value_blob", Some(TypeTag::Blob)),
        Column::new("type", Some(TypeTag::Text)),
    ]
}

impl SqliteStore {
    /// Save (or overwrite) a named variable
    pub fn save_var(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let (stored, kind) = encode(&value);
        let record = Record::new()
            .with("name", name)
            .with("value_blob", stored)
            .with("type", kind);

        let mut batch = SaveBatch::prepare(VARIABLES_TABLE, &["name"], Batch::from(record))?;
        batch.columns = variable_columns();
        self.save_batch(batch)
    }

    /// Read a named variable; `None` when it was never saved
    pub fn get_var(&mut self, name: &str) -> Result<Option<Value>> {
        self.flush()?;
        let conn = self.connection();
        let row = self.retry_policy().run(|| read_var(conn, name))?;
        row.map(|(stored, kind)| decode(&kind, stored)).transpose()
    }
}

fn read_var(conn: &Connection, name: &str) -> Result<Option<(SqlValue, String)>> {
    if !schema::table_exists(conn, VARIABLES_TABLE)? {
        return Ok(None);
    }
    let row = conn
        .query_row(
            "SELECT value_blob, type FROM swvariables WHERE name = ?1",
            [name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row)
}

/// Stored representation and kind tag of a variable value
fn encode(value: &Value) -> (Value, &'static str) {
    let stored = match value {
        Value::Bool(b) => Value::Integer(i64::from(*b)),
        Value::Text(s) => Value::Blob(s.as_bytes().to_vec()),
        Value::Date(d) => Value::Blob(value::format_date(d).into_bytes()),
        Value::DateTime(dt) => Value::Blob(value::format_datetime(dt).into_bytes()),
        other => other.clone(),
    };
    (stored, value.kind())
}

fn decode(kind: &str, stored: SqlValue) -> Result<Value> {
    let mismatch = |stored: &SqlValue| {
        Error::TypeMapping(format!("variable of type '{}' holds {:?}", kind, stored.data_type()))
    };

    match (kind, stored) {
        ("null", _) => Ok(Value::Null),
        ("boolean", SqlValue::Integer(i)) => Ok(Value::Bool(i != 0)),
        ("integer", SqlValue::Integer(i)) => Ok(Value::Integer(i)),
        ("real", SqlValue::Real(r)) => Ok(Value::Real(r)),
        ("real", SqlValue::Integer(i)) => Ok(Value::Real(i as f64)),
        ("blob", SqlValue::Blob(b)) => Ok(Value::Blob(b)),
        ("text" | "date" | "datetime", stored) => {
            let text = match stored {
                SqlValue::Blob(b) => String::from_utf8(b)
                    .map_err(|e| Error::TypeMapping(format!("variable is not valid UTF-8: {}", e)))?,
                SqlValue::Text(t) => t,
                other => return Err(mismatch(&other)),
            };
            match kind {
                "date" => value::parse_date(&text).map(Value::Date),
                "datetime" => value::parse_datetime(&text).map(Value::DateTime),
                _ => Ok(Value::Text(text)),
            }
        }
        ("boolean" | "integer" | "real" | "blob", other) => Err(mismatch(&other)),
        (unknown, _) => Err(Error::TypeMapping(format!("unknown variable type '{}'", unknown))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn savegetvar(value: Value) {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.save_var("weird", value.clone()).unwrap();
        assert_eq!(store.get_var("weird").unwrap(), Some(value));
    }

    #[test]
    fn test_round_trip_kinds() {
        savegetvar(Value::from("asdio"));
        savegetvar(Value::Integer(1));
        savegetvar(Value::Real(2.5));
        savegetvar(Value::Bool(true));
        savegetvar(Value::Blob(vec![0, 159, 146, 150]));
        savegetvar(Value::Null);
        savegetvar(Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        let date = NaiveDate::from_ymd_opt(1990, 3, 30).unwrap();
        savegetvar(Value::DateTime(date.and_hms_opt(0, 0, 0).unwrap()));
        savegetvar(Value::DateTime(date.and_hms_micro_opt(12, 30, 5, 26490).unwrap()));
    }

    #[test]
    fn test_missing_var_is_none() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_var("meatball").unwrap(), None);

        store.save_var("other", 1).unwrap();
        assert_eq!(store.get_var("meatball").unwrap(), None);
    }

    #[test]
    fn test_overwrite_keeps_one_row() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.save_var("foo", "hello").unwrap();
        store.save_var("bar", "goodbye").unwrap();
        store.save_var("foo", 42).unwrap();

        assert_eq!(store.get_var("foo").unwrap(), Some(Value::Integer(42)));
        assert_eq!(store.get_var("bar").unwrap(), Some(Value::from("goodbye")));
        let count = store.select("count(*) AS n from swvariables", ()).unwrap();
        assert_eq!(count[0].get("n"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_stored_layout() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.save_var("birthday", "November 30, 1888").unwrap();
        store.flush().unwrap();

        let row: (Vec<u8>, String) = store
            .connection()
            .query_row("SELECT value_blob, type FROM swvariables WHERE name = 'birthday'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(row, (b"November 30, 1888".to_vec(), "text".to_string()));
        assert_eq!(
            schema::unique_key(store.connection(), VARIABLES_TABLE).unwrap(),
            Some(vec!["name".to_string()])
        );
    }

    #[test]
    fn test_failed_flush_leaves_no_variables_table() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.connection().execute_batch("CREATE TABLE strict (a NOT NULL)").unwrap();

        store.save_var("cursor", 10).unwrap();
        store.save_into("strict", &[], Record::from([("a", Value::Null)])).unwrap();
        assert!(matches!(store.flush(), Err(Error::Query(_))));

        assert!(!schema::table_exists(store.connection(), VARIABLES_TABLE).unwrap());
        assert_eq!(store.get_var("cursor").unwrap(), None);
    }

    #[test]
    fn test_value_column_keeps_blob_affinity() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.save_var("first", 7).unwrap();
        store.save_var("ratio", 2.0).unwrap();
        store.flush().unwrap();

        let columns = schema::table_columns(store.connection(), VARIABLES_TABLE).unwrap();
        assert_eq!(columns, variable_columns());
        assert_eq!(store.get_var("ratio").unwrap(), Some(Value::Real(2.0)));
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        assert!(matches!(decode("matrix", SqlValue::Null), Err(Error::TypeMapping(_))));
        assert!(matches!(decode("integer", SqlValue::Text("x".into())), Err(Error::TypeMapping(_))));
    }
}
