//! Command-line presentation of query results
//!
//! Output format options (table, CSV, JSON, vertical)

mod output;

pub use output::{OutputFormat, OutputFormatter};
