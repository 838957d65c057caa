//! Schema management - lazy tables, additive columns, unique keys
//!
//! Tables are created from the first batch saved into them. Later batches can
//! only add columns; existing columns keep the type they were created with.
//! Each table carries at most one unique key, backed by an index named
//! `<table>_<col>..._unique`.

use rusqlite::{Connection, OptionalExtension};
use crate::value::TypeTag;
use crate::{Error, Result};

/// Target of `save` until `set_table` is called
pub const DEFAULT_TABLE: &str = "swdata";

/// Reserved table backing `save_var` / `get_var`
pub const VARIABLES_TABLE: &str = "swvariables";

/// Reserved table backing the run log
pub const RUNLOG_TABLE: &str = "_sw_runlog";

/// Quote an identifier so any string is usable as a table or column name.
///
/// Embedded double quotes are doubled; case is preserved.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Deterministic name of the index backing a table's unique key
pub fn unique_index_name(table: &str, keys: &[String]) -> String {
    format!("{}_{}_unique", table, keys.join("_"))
}

/// A column and its declared storage type (`None` for untyped columns)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub tag: Option<TypeTag>,
}

impl Column {
    pub fn new(name: impl Into<String>, tag: Option<TypeTag>) -> Self {
        Self { name: name.into(), tag }
    }

    /// Column definition as used in CREATE TABLE / ADD COLUMN
    pub fn definition(&self) -> String {
        match self.tag {
            Some(tag) => format!("{} {}", quote_ident(&self.name), tag.as_str()),
            None => quote_ident(&self.name),
        }
    }
}

/// Check whether a table exists (names compare case-insensitively, as in SQLite)
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            [table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Columns of a table in declaration order; empty when the table is absent
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<Column>> {
    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
    let columns = stmt
        .query_map([table], |row| {
            let name: String = row.get(0)?;
            let declared: String = row.get(1)?;
            Ok(Column::new(name, TypeTag::from_declared(&declared)))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// User tables in the store, by name
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let tables = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(tables)
}

/// The table's declared unique key, if any.
///
/// Only unique indexes following the `<table>_<cols>_unique` naming count;
/// indexes created by hand through `execute` are ignored.
pub fn unique_key(conn: &Connection, table: &str) -> Result<Option<Vec<String>>> {
    let mut list = conn.prepare(
        "SELECT name FROM pragma_index_list(?1) WHERE \"unique\" = 1 AND origin = 'c'",
    )?;
    let indexes = list
        .query_map([table], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    for index in indexes {
        let keys = info
            .query_map([&index], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        if index.eq_ignore_ascii_case(&unique_index_name(table, &keys)) {
            return Ok(Some(keys));
        }
    }
    Ok(None)
}

/// Same column list, in the same order (column names are case-insensitive)
pub fn same_key(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_ignore_ascii_case(y))
}

/// Create the table, or add whichever observed columns it lacks.
pub fn ensure_table(conn: &Connection, table: &str, observed: &[Column]) -> Result<()> {
    let existing = table_columns(conn, table)?;

    if existing.is_empty() {
        if observed.is_empty() {
            return Err(Error::RecordShape(format!("cannot create table '{}' with no columns", table)));
        }
        let definitions: Vec<String> = observed.iter().map(Column::definition).collect();
        let sql = format!("CREATE TABLE {} ({})", quote_ident(table), definitions.join(", "));
        tracing::debug!(table, columns = observed.len(), "creating table");
        conn.execute(&sql, [])?;
        return Ok(());
    }

    for column in observed {
        let present = existing.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name));
        if !present {
            let sql = format!("ALTER TABLE {} ADD COLUMN {}", quote_ident(table), column.definition());
            tracing::debug!(table, column = %column.name, tag = ?column.tag, "adding column");
            conn.execute(&sql, [])?;
        }
    }
    Ok(())
}

/// Declare the table's unique key; a different existing key is a conflict.
pub fn ensure_unique_key(conn: &Connection, table: &str, keys: &[String]) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }

    match unique_key(conn, table)? {
        Some(existing) if same_key(&existing, keys) => Ok(()),
        Some(existing) => Err(Error::SchemaConflict {
            table: table.to_string(),
            existing,
            requested: keys.to_vec(),
        }),
        None => {
            let columns: Vec<String> = keys.iter().map(|k| quote_ident(k)).collect();
            let sql = format!(
                "CREATE UNIQUE INDEX {} ON {} ({})",
                quote_ident(&unique_index_name(table, keys)),
                quote_ident(table),
                columns.join(", ")
            );
            tracing::debug!(table, keys = ?keys, "creating unique index");
            conn.execute(&sql, [])?;
            Ok(())
        }
    }
}
