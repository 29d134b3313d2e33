//! Adapter implementations
//!
//! - DuckDB for report storage
//! - JSON files for the `ExtractionSource` port

pub mod duckdb;
pub mod json_source;
