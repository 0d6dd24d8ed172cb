//! Flow Record Input Module
//!
//! Loads a batch of raw flow records from disk. Supported sources:
//! - Parquet files with `src_ip`, `first_seen`, `dst_org`, `dst_port` columns
//! - JSON arrays of record objects
//! - JSON Lines (one record object per line)
//!
//! Loading is a single blocking read; nothing is validated here beyond column
//! presence. Timestamp and port checks belong to the normalizer.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tracing::{debug, info};

use crate::error::InputError;
use crate::flow::{RawFlowRecord, RawPort, RawTimestamp, UNRESOLVED_ORG};

pub const SRC_IP_COLUMN: &str = "src_ip";
pub const FIRST_SEEN_COLUMN: &str = "first_seen";
pub const DST_ORG_COLUMN: &str = "dst_org";
pub const DST_PORT_COLUMN: &str = "dst_port";

/// Source file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Parquet,
    Json,
    JsonLines,
}

impl InputFormat {
    /// Infers the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, InputError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("parquet") | Some("pq") => Ok(Self::Parquet),
            Some("json") => Ok(Self::Json),
            Some("jsonl") | Some("ndjson") => Ok(Self::JsonLines),
            _ => Err(InputError::UnknownFormat {
                path: path.display().to_string(),
            }),
        }
    }
}

impl std::str::FromStr for InputFormat {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parquet" => Ok(Self::Parquet),
            "json" => Ok(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Ok(Self::JsonLines),
            _ => Err(InputError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for InputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parquet => write!(f, "parquet"),
            Self::Json => write!(f, "json"),
            Self::JsonLines => write!(f, "jsonl"),
        }
    }
}

/// Reads every raw record from `path`.
///
/// When `format` is `None` it is inferred from the file extension.
pub fn load_records(path: &Path, format: Option<InputFormat>) -> Result<Vec<RawFlowRecord>> {
    if !path.exists() {
        anyhow::bail!("Input file not found: {}", path.display());
    }

    let format = match format {
        Some(f) => f,
        None => InputFormat::from_path(path)?,
    };

    info!("Loading {} records from {}", format, path.display());

    let records = match format {
        InputFormat::Parquet => load_parquet(path)?,
        InputFormat::Json => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read input file: {}", path.display()))?;
            parse_json(&content)?
        }
        InputFormat::JsonLines => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read input file: {}", path.display()))?;
            parse_json_lines(&content)?
        }
    };

    info!("Loaded {} raw records", records.len());
    Ok(records)
}

/// Parses a JSON array of records.
pub fn parse_json(content: &str) -> Result<Vec<RawFlowRecord>, InputError> {
    serde_json::from_str(content).map_err(|source| InputError::Json {
        line: source.line(),
        source,
    })
}

/// Parses JSON Lines, skipping blank lines.
pub fn parse_json_lines(content: &str) -> Result<Vec<RawFlowRecord>, InputError> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| InputError::Json { line: i + 1, source })
        })
        .collect()
}

/// Reads a Parquet file batch by batch.
pub fn load_parquet(path: &Path) -> Result<Vec<RawFlowRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open Parquet file: {}", path.display()))?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(InputError::from)?;

    let schema = builder.schema();
    for column in [SRC_IP_COLUMN, FIRST_SEEN_COLUMN, DST_ORG_COLUMN, DST_PORT_COLUMN] {
        if schema.index_of(column).is_err() {
            return Err(InputError::MissingColumn {
                path: path.display().to_string(),
                column: column.to_string(),
            }
            .into());
        }
    }

    let reader = builder.build().map_err(InputError::from)?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.map_err(InputError::from)?;
        debug!("Decoding batch of {} rows", batch.num_rows());
        records.extend(records_from_batch(&batch)?);
    }

    Ok(records)
}

/// Converts one Arrow batch into raw records.
pub fn records_from_batch(batch: &RecordBatch) -> Result<Vec<RawFlowRecord>, InputError> {
    let src_ip = string_column(batch, SRC_IP_COLUMN)?;
    let dst_org = string_column(batch, DST_ORG_COLUMN)?;
    let first_seen = timestamp_column(batch)?;
    let dst_port = port_column(batch)?;

    let src_ip = src_ip.as_string::<i32>();
    let dst_org = dst_org.as_string::<i32>();

    let records = (0..batch.num_rows())
        .map(|row| RawFlowRecord {
            src_ip: if src_ip.is_null(row) {
                String::new()
            } else {
                src_ip.value(row).to_string()
            },
            first_seen: first_seen[row].clone(),
            // A null org is an unresolved org
            dst_org: if dst_org.is_null(row) {
                UNRESOLVED_ORG.to_string()
            } else {
                dst_org.value(row).to_string()
            },
            dst_port: dst_port[row],
        })
        .collect();

    Ok(records)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef, InputError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| InputError::MissingColumn {
            path: "<batch>".to_string(),
            column: name.to_string(),
        })
}

fn string_column(batch: &RecordBatch, name: &str) -> Result<ArrayRef, InputError> {
    Ok(cast(column(batch, name)?, &DataType::Utf8)?)
}

/// Integer columns become `Integer`, float columns `Number`; the normalizer
/// decides whether a float is a usable port.
fn port_column(batch: &RecordBatch) -> Result<Vec<RawPort>, InputError> {
    let array = column(batch, DST_PORT_COLUMN)?;

    match array.data_type() {
        dt if dt.is_integer() => {
            let ports = cast(array, &DataType::Int64)?;
            let ports = ports.as_primitive::<Int64Type>();
            Ok((0..ports.len())
                .map(|i| {
                    if ports.is_null(i) {
                        RawPort::Missing
                    } else {
                        RawPort::Integer(ports.value(i))
                    }
                })
                .collect())
        }
        dt if dt.is_floating() => {
            let ports = cast(array, &DataType::Float64)?;
            let ports = ports.as_primitive::<Float64Type>();
            Ok((0..ports.len())
                .map(|i| {
                    if ports.is_null(i) {
                        RawPort::Missing
                    } else {
                        RawPort::Number(ports.value(i))
                    }
                })
                .collect())
        }
        other => Err(InputError::UnsupportedColumnType {
            column: DST_PORT_COLUMN.to_string(),
            data_type: other.to_string(),
        }),
    }
}

/// Numeric columns become `Number`, string columns keep the raw text.
fn timestamp_column(batch: &RecordBatch) -> Result<Vec<RawTimestamp>, InputError> {
    let array = column(batch, FIRST_SEEN_COLUMN)?;

    match array.data_type() {
        DataType::Utf8 | DataType::LargeUtf8 => {
            let text = cast(array, &DataType::Utf8)?;
            let text = text.as_string::<i32>();
            Ok((0..text.len())
                .map(|i| {
                    if text.is_null(i) {
                        RawTimestamp::Missing
                    } else {
                        RawTimestamp::Text(text.value(i).to_string())
                    }
                })
                .collect())
        }
        dt if dt.is_numeric() => {
            let numbers = cast(array, &DataType::Float64)?;
            let numbers = numbers.as_primitive::<Float64Type>();
            Ok((0..numbers.len())
                .map(|i| {
                    if numbers.is_null(i) {
                        RawTimestamp::Missing
                    } else {
                        RawTimestamp::Number(numbers.value(i))
                    }
                })
                .collect())
        }
        other => Err(InputError::UnsupportedColumnType {
            column: FIRST_SEEN_COLUMN.to_string(),
            data_type: other.to_string(),
        }),
    }
}
