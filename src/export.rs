//! Export Module
//!
//! Renders analysis reports as text, JSON or JSON Lines for downstream
//! plotting and reporting tools. The JSONL form is one summary line followed by
//! one [`GroupRecord`] per group, and can be read back with
//! [`read_group_records`].

use serde::{Deserialize, Serialize};

use crate::analyzer::{AnalysisReport, DeltaSummary, GroupAnalysis};
use crate::flow::{GroupKey, RejectedRecord};

/// Output format for exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonLines, // One JSON object per line (JSONL)
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "jsonl" | "jsonlines" => Ok(Self::JsonLines),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::JsonLines => write!(f, "jsonl"),
        }
    }
}

/// Which groups an export lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Also list groups that were excluded from the spectrum stage.
    pub include_excluded: bool,
}

/// Serializable per-group result: key fields, bin counts and spectrum magnitudes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub src_ip: String,
    pub dst_org: String,
    pub dst_port: u16,
    pub delta_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_delta_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median_delta_secs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_dev_delta_secs: Option<f64>,
    pub bin_counts: Vec<u64>,
    /// Empty for excluded groups.
    #[serde(default)]
    pub magnitudes: Vec<f64>,
    #[serde(default)]
    pub excluded: bool,
}

impl GroupRecord {
    pub fn key(&self) -> GroupKey {
        GroupKey::new(&self.src_ip, &self.dst_org, self.dst_port)
    }
}

impl From<&GroupAnalysis> for GroupRecord {
    fn from(group: &GroupAnalysis) -> Self {
        let summary = group.summary.as_ref();
        Self {
            src_ip: group.key.src_ip.clone(),
            dst_org: group.key.dst_org.clone(),
            dst_port: group.key.dst_port,
            delta_count: group.deltas.len(),
            mean_delta_secs: summary.map(|s| s.mean),
            median_delta_secs: summary.map(|s| s.median),
            std_dev_delta_secs: summary.map(|s| s.std_dev),
            bin_counts: group.histogram.counts().to_vec(),
            magnitudes: group
                .spectrum
                .as_ref()
                .map(|s| s.magnitudes())
                .unwrap_or_default(),
            excluded: group.is_excluded(),
        }
    }
}

/// JSON-serializable analysis report
#[derive(Serialize)]
pub struct JsonReport {
    pub version: &'static str,
    pub timestamp: String,
    pub bin_size_seconds: f64,
    pub num_bins: usize,
    pub min_timestamp: f64,
    pub records_total: usize,
    pub records_valid: usize,
    pub records_rejected: usize,
    pub group_count: usize,
    pub analyzed_groups: usize,
    pub excluded_groups: usize,
    pub groups: Vec<GroupRecord>,
    pub rejected: Vec<RejectedRecord>,
}

impl JsonReport {
    pub fn new(report: &AnalysisReport, options: ExportOptions) -> Self {
        Self {
            version: "1.0",
            timestamp: report.generated_at.to_rfc3339(),
            bin_size_seconds: report.bin_size_seconds,
            num_bins: report.num_bins,
            min_timestamp: report.min_timestamp,
            records_total: report.records_total,
            records_valid: report.records_valid,
            records_rejected: report.rejected.len(),
            group_count: report.groups.len(),
            analyzed_groups: report.analyzed_groups(),
            excluded_groups: report.excluded_groups(),
            groups: group_records(report, options),
            rejected: report.rejected.clone(),
        }
    }
}

/// Per-group records in key order.
pub fn group_records(report: &AnalysisReport, options: ExportOptions) -> Vec<GroupRecord> {
    report
        .groups
        .values()
        .filter(|g| options.include_excluded || !g.is_excluded())
        .map(GroupRecord::from)
        .collect()
}

/// Exports a report in the specified format
pub fn export_report(report: &AnalysisReport, format: OutputFormat, options: ExportOptions) -> String {
    match format {
        OutputFormat::Text => export_text(report, options),
        OutputFormat::Json => export_json(report, options),
        OutputFormat::JsonLines => export_jsonl(report, options),
    }
}

/// Exports report as pretty-printed JSON
pub fn export_json(report: &AnalysisReport, options: ExportOptions) -> String {
    let json_report = JsonReport::new(report, options);
    serde_json::to_string_pretty(&json_report)
        .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

/// Exports report as JSON Lines (one group per line)
pub fn export_jsonl(report: &AnalysisReport, options: ExportOptions) -> String {
    let mut lines = Vec::new();

    // First line is the summary
    let summary = serde_json::json!({
        "type": "summary",
        "timestamp": report.generated_at.to_rfc3339(),
        "bin_size_seconds": report.bin_size_seconds,
        "num_bins": report.num_bins,
        "min_timestamp": report.min_timestamp,
        "records_total": report.records_total,
        "records_valid": report.records_valid,
        "records_rejected": report.rejected.len(),
        "analyzed_groups": report.analyzed_groups(),
        "excluded_groups": report.excluded_groups(),
    });
    lines.push(serde_json::to_string(&summary).unwrap_or_default());

    // Each group is a separate line
    for record in group_records(report, options) {
        if let Ok(line) = serde_json::to_string(&record) {
            lines.push(line);
        }
    }

    lines.join("\n")
}

/// Reads the group lines of a JSONL export, skipping the summary line.
pub fn read_group_records(content: &str) -> serde_json::Result<Vec<GroupRecord>> {
    let mut records = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let value: serde_json::Value = serde_json::from_str(line)?;
        if value.get("type").and_then(|t| t.as_str()) == Some("summary") {
            continue;
        }
        records.push(serde_json::from_value(value)?);
    }
    Ok(records)
}

/// Exports report as formatted text
pub fn export_text(report: &AnalysisReport, options: ExportOptions) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "--- Spectrum Report ---\nTime: {}\nBins: {} x {}\nRecords: {} ({} valid, {} rejected)\nGroups: {} ({} analyzed, {} excluded)\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S"),
        report.num_bins,
        format_seconds(report.bin_size_seconds),
        report.records_total,
        report.records_valid,
        report.rejected.len(),
        report.groups.len(),
        report.analyzed_groups(),
        report.excluded_groups(),
    ));

    let records = group_records(report, options);
    if records.is_empty() {
        output.push_str("No groups to report\n");
    } else {
        output.push('\n');
        output.push_str(&format!(
            "{:<45} {:>7} {:>10}  {:<24} {}\n",
            "Group", "Deltas", "Mean", "Bins", "|FFT|"
        ));
        output.push_str(&"-".repeat(110));
        output.push('\n');

        for record in &records {
            let magnitudes = if record.excluded {
                "excluded".to_string()
            } else {
                record
                    .magnitudes
                    .iter()
                    .map(|m| format!("{:.2}", m))
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            output.push_str(&format!(
                "{:<45} {:>7} {:>10}  {:<24} {}\n",
                record.key().to_string(),
                record.delta_count,
                record
                    .mean_delta_secs
                    .map(format_seconds)
                    .unwrap_or_else(|| "N/A".to_string()),
                format!("{:?}", record.bin_counts),
                magnitudes,
            ));
        }
    }

    if !report.rejected.is_empty() {
        output.push_str(&format!("\nRejected Records ({}):\n", report.rejected.len()));
        for rejected in &report.rejected {
            output.push_str(&format!(
                "  {} -> {}:{} | {}\n",
                rejected.src_ip,
                rejected.dst_org,
                rejected.dst_port,
                rejected.reason,
            ));
        }
    }

    output
}

/// Formats a duration in seconds in a human-readable way
fn format_seconds(secs: f64) -> String {
    if secs >= 3600.0 {
        format!("{:.1}h", secs / 3600.0)
    } else if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}s", secs)
    }
}

/// Summary line for a single group (for log output)
pub fn describe_summary(summary: Option<&DeltaSummary>) -> String {
    match summary {
        Some(s) => format!(
            "{} deltas, mean {}, median {}",
            s.count,
            format_seconds(s.mean),
            format_seconds(s.median)
        ),
        None => "no deltas".to_string(),
    }
}
