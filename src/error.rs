//! Domain-specific error types for beacon-spectrum.
//!
//! Uses `thiserror` for ergonomic error definitions that integrate
//! with the broader `anyhow` error handling strategy.

use thiserror::Error;

/// Per-record problems found while normalizing raw flow records.
///
/// These never abort the pipeline: the record is skipped and reported.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("timestamp '{raw}' is not a number")]
    MalformedTimestamp { raw: String },

    #[error("timestamp {value} is negative")]
    NegativeTimestamp { value: f64 },

    #[error("destination port '{raw}' is not a valid port")]
    MalformedPort { raw: String },
}

/// Fatal failures of the analysis pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("No valid flow records (read {total}, all rejected); cannot establish a time origin")]
    EmptyValidInput { total: usize },

    #[error("Invalid spectrum settings: {0}")]
    InvalidSettings(String),
}

/// Errors that can occur while loading raw records from disk.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Cannot infer input format from '{path}' (expected .parquet, .json or .jsonl)")]
    UnknownFormat { path: String },

    #[error("Unknown input format: {0}")]
    UnsupportedFormat(String),

    #[error("Required column '{column}' not found in {path}")]
    MissingColumn { path: String, column: String },

    #[error("Column '{column}' has unsupported type {data_type}")]
    UnsupportedColumnType { column: String, data_type: String },

    #[error("Failed to read Parquet data: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Failed to decode Arrow batch: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Failed to parse JSON record at line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
