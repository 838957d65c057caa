//! Dynamic values - the scalar kinds a record column can hold
//!
//! Storage types are never declared by callers; they are inferred per value:
//! - `Bool`, `Integer` -> `integer` (booleans stored as 0/1)
//! - `Real` -> `real`
//! - `Text`, `Date`, `DateTime` -> `text` (dates in canonical string form)
//! - `Blob` -> `blob`
//! - `Null` -> no constraint on the column

use crate::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde::{Serialize, Serializer};
use std::fmt;

/// Canonical rendering of a date
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Canonical rendering of a datetime with no sub-second part
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Canonical rendering of a datetime with microseconds
pub const DATETIME_MICROS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
/// Accepts both datetime renderings when parsing
const DATETIME_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A dynamically-typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// Storage type tag of a column, named after SQLite's storage classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Integer,
    Real,
    Text,
    Blob,
}

impl TypeTag {
    /// Type name used in column declarations
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Integer => "integer",
            TypeTag::Real => "real",
            TypeTag::Text => "text",
            TypeTag::Blob => "blob",
        }
    }

    /// Map a declared column type back to a tag using SQLite's affinity rules.
    ///
    /// Untyped columns (and NUMERIC affinity) have no tag.
    pub fn from_declared(declared: &str) -> Option<Self> {
        let declared = declared.to_ascii_lowercase();
        if declared.contains("int") {
            Some(TypeTag::Integer)
        } else if declared.contains("char") || declared.contains("clob") || declared.contains("text") {
            Some(TypeTag::Text)
        } else if declared.contains("blob") {
            Some(TypeTag::Blob)
        } else if declared.contains("real") || declared.contains("floa") || declared.contains("doub") {
            Some(TypeTag::Real)
        } else {
            None
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Infer the storage tag a value contributes to its column.
pub fn infer(value: &Value) -> Option<TypeTag> {
    match value {
        Value::Null => None,
        Value::Bool(_) | Value::Integer(_) => Some(TypeTag::Integer),
        Value::Real(_) => Some(TypeTag::Real),
        Value::Text(_) | Value::Date(_) | Value::DateTime(_) => Some(TypeTag::Text),
        Value::Blob(_) => Some(TypeTag::Blob),
    }
}

/// Convert a value to the representation actually written to the store.
pub fn render(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(r) => SqlValue::Real(*r),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
        Value::Date(d) => SqlValue::Text(format_date(d)),
        Value::DateTime(dt) => SqlValue::Text(format_datetime(dt)),
    }
}

/// Render a date as `YYYY-MM-DD`
pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Render a datetime, with microseconds only when the sub-second part is set
pub fn format_datetime(datetime: &NaiveDateTime) -> String {
    if datetime.nanosecond() == 0 {
        datetime.format(DATETIME_FORMAT).to_string()
    } else {
        datetime.format(DATETIME_MICROS_FORMAT).to_string()
    }
}

/// Parse a canonical date string
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| Error::TypeMapping(format!("invalid date '{}': {}", s, e)))
}

/// Parse a canonical datetime string (fractional seconds optional)
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, DATETIME_PARSE_FORMAT)
        .map_err(|e| Error::TypeMapping(format!("invalid datetime '{}': {}", s, e)))
}

impl Value {
    /// Name of the value's kind
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
        }
    }

    pub fn type_tag(&self) -> Option<TypeTag> {
        infer(self)
    }

    pub fn render(&self) -> SqlValue {
        render(self)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Build a value from a JSON scalar.
    ///
    /// Arrays and objects have no column mapping.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Value::Real(f))
                } else {
                    Err(Error::TypeMapping(format!("number {} does not fit a column", n)))
                }
            }
            serde_json::Value::String(s) => Ok(Value::Text(s)),
            serde_json::Value::Array(_) => {
                Err(Error::TypeMapping("a JSON array cannot be stored as a column value".to_string()))
            }
            serde_json::Value::Object(_) => {
                Err(Error::TypeMapping("a JSON object cannot be stored as a column value".to_string()))
            }
        }
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = Error;

    fn try_from(json: serde_json::Value) -> Result<Self> {
        Value::from_json(json)
    }
}

/// Values read back from the store are taken as stored; no date re-parsing.
impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

impl From<SqlValue> for Value {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::Integer(i),
            SqlValue::Real(r) => Value::Real(r),
            SqlValue::Text(t) => Value::Text(t),
            SqlValue::Blob(b) => Value::Blob(b),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(self.render()))
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    i64 => Integer,
    i32 => Integer,
    u32 => Integer,
    f64 => Real,
    f32 => Real,
    String => Text,
    &str => Text,
    Vec<u8> => Blob,
    &[u8] => Blob,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", i64::from(*b)),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(d) => write!(f, "{}", format_date(d)),
            Value::DateTime(dt) => write!(f, "{}", format_datetime(dt)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(r) => serializer.serialize_f64(*r),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_bytes(b),
            Value::Date(d) => serializer.serialize_str(&format_date(d)),
            Value::DateTime(dt) => serializer.serialize_str(&format_datetime(dt)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datetime(s: &str) -> NaiveDateTime {
        parse_datetime(s).unwrap()
    }

    #[test]
    fn test_infer_tags() {
        assert_eq!(infer(&Value::Bool(true)), Some(TypeTag::Integer));
        assert_eq!(infer(&Value::Integer(7)), Some(TypeTag::Integer));
        assert_eq!(infer(&Value::Real(1.5)), Some(TypeTag::Real));
        assert_eq!(infer(&Value::from("x")), Some(TypeTag::Text));
        assert_eq!(infer(&Value::Blob(vec![1, 2])), Some(TypeTag::Blob));
        assert_eq!(infer(&Value::Date(NaiveDate::from_ymd_opt(1990, 3, 30).unwrap())), Some(TypeTag::Text));
        assert_eq!(infer(&Value::Null), None);
    }

    #[test]
    fn test_render_booleans_and_dates() {
        assert_eq!(render(&Value::Bool(true)), SqlValue::Integer(1));
        assert_eq!(render(&Value::Bool(false)), SqlValue::Integer(0));

        let date = NaiveDate::from_ymd_opt(1990, 3, 30).unwrap();
        assert_eq!(render(&Value::Date(date)), SqlValue::Text("1990-03-30".to_string()));

        let midnight = date.and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(render(&Value::DateTime(midnight)), SqlValue::Text("1990-03-30 00:00:00".to_string()));

        let precise = date.and_hms_micro_opt(12, 30, 5, 26490).unwrap();
        assert_eq!(
            render(&Value::DateTime(precise)),
            SqlValue::Text("1990-03-30 12:30:05.026490".to_string())
        );
    }

    #[test]
    fn test_parse_datetime_with_and_without_fraction() {
        assert_eq!(datetime("1990-03-30 00:00:00").nanosecond(), 0);
        assert_eq!(datetime("1990-03-30 12:30:05.026490").nanosecond(), 26_490_000);
        assert!(parse_datetime("March 30").is_err());
        assert!(parse_date("1990-13-01").is_err());
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Value::from_json(serde_json::json!(293)).unwrap(), Value::Integer(293));
        assert_eq!(Value::from_json(serde_json::json!(2.5)).unwrap(), Value::Real(2.5));
        assert_eq!(Value::from_json(serde_json::json!("a")).unwrap(), Value::from("a"));
        assert_eq!(Value::from_json(serde_json::json!(null)).unwrap(), Value::Null);

        let err = Value::from_json(serde_json::json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::TypeMapping(_)));
        assert!(Value::from_json(serde_json::json!({"a": 1})).is_err());
    }

    #[test]
    fn test_declared_type_affinity() {
        assert_eq!(TypeTag::from_declared("integer"), Some(TypeTag::Integer));
        assert_eq!(TypeTag::from_declared("VARCHAR(20)"), Some(TypeTag::Text));
        assert_eq!(TypeTag::from_declared("double"), Some(TypeTag::Real));
        assert_eq!(TypeTag::from_declared("blob"), Some(TypeTag::Blob));
        assert_eq!(TypeTag::from_declared(""), None);
    }

    #[test]
    fn test_option_into_value() {
        let missing: Option<&str> = None;
        assert_eq!(Value::from(missing), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Integer(3));
    }
}
