//! Positional statement parameters
//!
//! Anything accepted as a single value binds as a one-element list, so
//! `execute(sql, "apple")` and `execute(sql, ["apple"])` are equivalent.

use chrono::{NaiveDate, NaiveDateTime};
use crate::value::Value;

/// Ordered values bound to `?` placeholders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::new()
    }
}

impl<T: Into<Value>> From<Vec<T>> for Params {
    fn from(values: Vec<T>) -> Self {
        Params(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Params {
    fn from(values: [T; N]) -> Self {
        Params(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Params {
    fn from(values: &[T]) -> Self {
        Params(values.iter().cloned().map(Into::into).collect())
    }
}

macro_rules! impl_scalar_params {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Params {
                fn from(value: $ty) -> Self {
                    Params(vec![value.into()])
                }
            }
        )*
    };
}

impl_scalar_params!(Value, bool, i64, i32, u32, f64, String, &str, NaiveDate, NaiveDateTime);
