//! Query facade
//!
//! Raw statements with positional parameters, returned either cursor-style
//! (`QueryResult { keys, data }`) or as one record per row. Values come back
//! exactly as stored; dates stay strings.

pub mod engine;
pub mod params;

pub use engine::{QueryResult, run_statement};
pub use params::Params;
