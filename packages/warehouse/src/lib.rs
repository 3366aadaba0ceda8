#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Star-schema builder and aggregation engine for traffic accidents.
//!
//! Turns a cleaned, flat CSV of accident observations into three dimension
//! tables (time, location, weather), one fact table whose foreign keys are
//! proven to resolve, and seven pre-aggregated summary tables.
//!
//! The pipeline is linear: dimension builders run in parallel, the fact
//! assembler resolves keys against their finished mappings, the integrity
//! validator proves referential integrity, and only then are aggregates
//! computed. Nothing is written to disk until every stage has succeeded.

pub mod aggregate;
pub mod config;
pub mod dimensions;
pub mod fact;
pub mod integrity;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod quality;
pub mod reader;
pub mod verify;

#[cfg(test)]
mod test_support;

use thiserror::Error;

pub use integrity::IntegrityReport;
pub use pipeline::{WarehouseBuild, build_warehouse};

/// Input schema violations, reported before any dimension is built.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// One or more required columns are absent from the header.
    #[error("Missing required columns in {path}: {}", columns.join(", "))]
    MissingColumns {
        /// Input file path.
        path: String,
        /// Names of the missing columns.
        columns: Vec<String>,
    },

    /// A cell could not be converted to its column's type.
    #[error("Invalid value {value:?} in column {column} at row {row}: {message}")]
    InvalidValue {
        /// 1-based data row number (header excluded).
        row: u64,
        /// Column name.
        column: String,
        /// Raw cell contents.
        value: String,
        /// Why the value was rejected.
        message: String,
    },

    /// The CSV itself was malformed or unreadable.
    #[error("CSV error reading {path}: {source}")]
    Csv {
        /// Input file path.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },
}

/// Errors that can occur while building, writing, or verifying a warehouse.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// The input did not match the cleaned-record schema.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A fact row could not resolve one of its dimension keys.
    #[error("Accident {accident_id} has no {dimension} key")]
    MissingKey {
        /// Accident whose lookup failed.
        accident_id: String,
        /// Dimension that was consulted (`time`, `location`, `weather`).
        dimension: String,
    },

    /// Orphaned foreign keys or duplicate primary keys were found.
    #[error("Referential integrity check failed: {0}")]
    Integrity(IntegrityReport),

    /// Too many data-quality warnings relative to the record count.
    #[error(
        "Data quality warnings exceed tolerance: {warnings} warnings for {records} records \
         (max fraction {max_fraction})"
    )]
    WarningToleranceExceeded {
        /// Number of warnings raised.
        warnings: u64,
        /// Number of input records.
        records: u64,
        /// Configured `max_warning_fraction`.
        max_fraction: f64,
    },

    /// The configuration was rejected.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },

    /// A configuration file could not be parsed.
    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        /// Config file path.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// The effective configuration could not be rendered as TOML.
    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being read or written.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Writing or re-reading an output CSV failed.
    #[error("CSV error on {path}: {source}")]
    Csv {
        /// Path being read or written.
        path: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WarehouseError {
    /// Wraps an I/O error with the path it occurred on.
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Wraps a CSV error with the path it occurred on.
    pub(crate) fn csv(path: &std::path::Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.display().to_string(),
            source,
        }
    }
}
