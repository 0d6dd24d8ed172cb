//! Flow record model and normalization.
//!
//! Raw records arrive with loosely typed columns (timestamps may be numbers or
//! strings, ports may be missing). Normalization validates each record, shifts
//! timestamps to a common origin and sorts them by group key then time, which
//! is the precondition of the delta extractor.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PipelineError, RecordError};

/// Destination org value used by flow sources for an unresolved organization.
pub const UNRESOLVED_ORG: &str = "N/A";

/// Unique identifier for a delta series.
/// Field order is the sort order: source, destination org, destination port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub src_ip: String,
    pub dst_org: String,
    pub dst_port: u16,
}

impl GroupKey {
    pub fn new(src_ip: impl Into<String>, dst_org: impl Into<String>, dst_port: u16) -> Self {
        Self {
            src_ip: src_ip.into(),
            dst_org: dst_org.into(),
            dst_port,
        }
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}:{}", self.src_ip, self.dst_org, self.dst_port)
    }
}

/// Timestamp column value as read from the input source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Number(f64),
    Text(String),
    #[default]
    Missing,
}

impl RawTimestamp {
    /// Parses the value into seconds, rejecting non-numeric and negative values.
    pub fn parse_seconds(&self) -> Result<f64, RecordError> {
        let value = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse::<f64>().map_err(|_| self.malformed())?,
            Self::Missing => return Err(self.malformed()),
        };

        if !value.is_finite() {
            return Err(self.malformed());
        }
        if value < 0.0 {
            return Err(RecordError::NegativeTimestamp { value });
        }
        Ok(value)
    }

    fn malformed(&self) -> RecordError {
        RecordError::MalformedTimestamp {
            raw: self.to_string(),
        }
    }
}

impl std::fmt::Display for RawTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
            Self::Missing => write!(f, "<missing>"),
        }
    }
}

/// Port column value as read from the input source.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPort {
    Integer(i64),
    Number(f64),
    #[default]
    Missing,
}

impl RawPort {
    /// Accepts integers in `0..=65535`; floats only when integral.
    pub fn parse_port(&self) -> Result<u16, RecordError> {
        let port = match *self {
            Self::Integer(n) => u16::try_from(n).ok(),
            Self::Number(n) if n.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&n) => {
                Some(n as u16)
            }
            _ => None,
        };

        port.ok_or_else(|| RecordError::MalformedPort {
            raw: self.to_string(),
        })
    }
}

impl std::fmt::Display for RawPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{}", n),
            Self::Number(n) => write!(f, "{}", n),
            Self::Missing => write!(f, "<missing>"),
        }
    }
}

/// A flow record exactly as loaded, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFlowRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub src_ip: String,
    #[serde(default)]
    pub first_seen: RawTimestamp,
    #[serde(default = "unresolved_org", deserialize_with = "null_as_unresolved")]
    pub dst_org: String,
    #[serde(default)]
    pub dst_port: RawPort,
}

fn unresolved_org() -> String {
    UNRESOLVED_ORG.to_string()
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A null org is an unresolved org, the same as in Parquet input.
fn null_as_unresolved<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(unresolved_org))
}

impl RawFlowRecord {
    pub fn new(
        src_ip: impl Into<String>,
        dst_org: impl Into<String>,
        dst_port: i64,
        first_seen: RawTimestamp,
    ) -> Self {
        Self {
            src_ip: src_ip.into(),
            first_seen,
            dst_org: dst_org.into(),
            dst_port: RawPort::Integer(dst_port),
        }
    }

    /// Validates the record into a group key and an absolute timestamp.
    pub fn validate(&self) -> Result<(GroupKey, f64), RecordError> {
        let port = self.dst_port.parse_port()?;
        let seconds = self.first_seen.parse_seconds()?;

        Ok((GroupKey::new(&self.src_ip, &self.dst_org, port), seconds))
    }
}

/// A validated flow record. `first_seen` is seconds since the batch origin.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecord {
    pub key: GroupKey,
    pub first_seen: f64,
}

/// A raw record that failed validation, with the raw values that caused it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    pub src_ip: String,
    pub dst_org: String,
    pub dst_port: RawPort,
    #[serde(serialize_with = "serialize_reason")]
    pub reason: RecordError,
}

fn serialize_reason<S>(reason: &RecordError, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(reason)
}

/// Output of the normalizer.
#[derive(Debug, Clone)]
pub struct NormalizedFlows {
    /// Smallest non-negative parseable absolute timestamp in the batch; the
    /// origin of `records[*].first_seen`.
    pub min_timestamp: f64,
    /// Valid records sorted by (src_ip, dst_org, dst_port, first_seen).
    pub records: Vec<FlowRecord>,
    pub rejected: Vec<RejectedRecord>,
}

impl NormalizedFlows {
    /// Total number of raw records that went into normalization.
    pub fn total(&self) -> usize {
        self.records.len() + self.rejected.len()
    }
}

/// Validates, re-bases and sorts raw flow records.
///
/// Invalid records are skipped and reported through `tracing` and the
/// `rejected` list. Fails only when no record survives.
pub fn normalize<I>(raw: I) -> Result<NormalizedFlows, PipelineError>
where
    I: IntoIterator<Item = RawFlowRecord>,
{
    let mut valid: Vec<FlowRecord> = Vec::new();
    let mut rejected = Vec::new();
    // Origin covers every usable timestamp, even on records rejected for their port
    let mut origin: Option<f64> = None;

    for record in raw {
        if let Ok(seconds) = record.first_seen.parse_seconds() {
            origin = Some(origin.map_or(seconds, |o| o.min(seconds)));
        }

        match record.validate() {
            Ok((key, first_seen)) => valid.push(FlowRecord { key, first_seen }),
            Err(reason) => {
                warn!(
                    "Skipping record src_ip {}, dst_org {}, dst_port {}: {}",
                    record.src_ip, record.dst_org, record.dst_port, reason
                );
                rejected.push(RejectedRecord {
                    src_ip: record.src_ip,
                    dst_org: record.dst_org,
                    dst_port: record.dst_port,
                    reason,
                });
            }
        }
    }

    let min_timestamp = match origin {
        Some(origin) if !valid.is_empty() => origin,
        _ => {
            return Err(PipelineError::EmptyValidInput {
                total: rejected.len(),
            })
        }
    };

    for record in &mut valid {
        record.first_seen -= min_timestamp;
    }
    valid.sort_by(compare_records);

    debug!(
        "Normalized {} records ({} rejected), origin {}",
        valid.len(),
        rejected.len(),
        min_timestamp
    );

    Ok(NormalizedFlows {
        min_timestamp,
        records: valid,
        rejected,
    })
}

fn compare_records(a: &FlowRecord, b: &FlowRecord) -> Ordering {
    a.key
        .cmp(&b.key)
        .then_with(|| a.first_seen.total_cmp(&b.first_seen))
}
