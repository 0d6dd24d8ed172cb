//! Spectrum analysis pipeline.
//!
//! Ties the stages together:
//!
//! ```text
//! raw records ─> normalize ─> extract_deltas ─> histogram ─> DFT
//!                 (flow)        (deltas)          (spectrum)
//! ```
//!
//! Every group gets a histogram. Groups whose destination org is the excluded
//! sentinel (unresolved organization) stop there and never get a spectrum.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use statrs::statistics::{Data, Distribution, Max, Min, OrderStatistics};
use tracing::{debug, info};

use crate::config::SpectrumConfig;
use crate::deltas::{extract_deltas, DeltaSeries};
use crate::error::PipelineError;
use crate::flow::{normalize, GroupKey, RawFlowRecord, RejectedRecord};
use crate::spectrum::{Binning, Histogram, Spectrum, SpectrumEngine};

/// Descriptive statistics of a delta series (seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaSummary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl DeltaSummary {
    /// Returns `None` for an empty series.
    pub fn from_deltas(deltas: &[f64]) -> Option<Self> {
        if deltas.is_empty() {
            return None;
        }

        let mut data = Data::new(deltas.to_vec());

        Some(Self {
            count: deltas.len(),
            mean: data.mean().unwrap_or(0.0),
            // Undefined for a single sample
            std_dev: data.std_dev().filter(|s| s.is_finite()).unwrap_or(0.0),
            min: data.min(),
            max: data.max(),
            median: data.median(),
        })
    }
}

/// Everything computed for one group.
#[derive(Debug, Clone)]
pub struct GroupAnalysis {
    pub key: GroupKey,
    pub deltas: DeltaSeries,
    pub summary: Option<DeltaSummary>,
    pub histogram: Histogram,
    /// `None` for groups with the excluded destination org.
    pub spectrum: Option<Spectrum>,
}

impl GroupAnalysis {
    pub fn is_excluded(&self) -> bool {
        self.spectrum.is_none()
    }
}

/// Result of one batch run.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub bin_size_seconds: f64,
    pub num_bins: usize,
    /// Absolute timestamp used as the time origin.
    pub min_timestamp: f64,
    pub records_total: usize,
    pub records_valid: usize,
    pub rejected: Vec<RejectedRecord>,
    pub groups: BTreeMap<GroupKey, GroupAnalysis>,
}

impl AnalysisReport {
    /// Group key to spectrum, for non-excluded groups only.
    pub fn spectra(&self) -> BTreeMap<&GroupKey, &Spectrum> {
        self.groups
            .iter()
            .filter_map(|(key, group)| group.spectrum.as_ref().map(|s| (key, s)))
            .collect()
    }

    /// Group key to histogram, for every group.
    pub fn histograms(&self) -> BTreeMap<&GroupKey, &Histogram> {
        self.groups
            .iter()
            .map(|(key, group)| (key, &group.histogram))
            .collect()
    }

    pub fn analyzed_groups(&self) -> usize {
        self.groups.values().filter(|g| !g.is_excluded()).count()
    }

    pub fn excluded_groups(&self) -> usize {
        self.groups.values().filter(|g| g.is_excluded()).count()
    }
}

/// Batch analyzer configured with binning and filtering policy.
#[derive(Debug, Clone)]
pub struct SpectrumAnalyzer {
    engine: SpectrumEngine,
    excluded_dest_org: String,
    parallel: bool,
}

impl SpectrumAnalyzer {
    /// Builds an analyzer, rejecting a bin width that is not a positive
    /// finite number or a zero bin count.
    pub fn new(config: &SpectrumConfig) -> Result<Self, PipelineError> {
        if !config.bin_size_seconds.is_finite() || config.bin_size_seconds <= 0.0 {
            return Err(PipelineError::InvalidSettings(format!(
                "bin_size_seconds must be a positive number, got {}",
                config.bin_size_seconds
            )));
        }
        if config.num_bins == 0 {
            return Err(PipelineError::InvalidSettings(
                "num_bins must be greater than 0".to_string(),
            ));
        }

        Ok(Self::with_binning(
            Binning::new(config.bin_size_seconds, config.num_bins),
            config,
        ))
    }

    fn with_binning(binning: Binning, config: &SpectrumConfig) -> Self {
        Self {
            engine: SpectrumEngine::new(binning),
            excluded_dest_org: config.excluded_dest_org.clone(),
            parallel: config.parallel,
        }
    }

    pub fn engine(&self) -> &SpectrumEngine {
        &self.engine
    }

    /// Returns true when the group carries no actionable destination identity.
    pub fn is_excluded(&self, key: &GroupKey) -> bool {
        key.dst_org == self.excluded_dest_org
    }

    /// Runs the whole pipeline over an in-memory batch of raw records.
    pub fn analyze<I>(&self, raw: I) -> Result<AnalysisReport, PipelineError>
    where
        I: IntoIterator<Item = RawFlowRecord>,
    {
        let normalized = normalize(raw)?;
        let records_total = normalized.total();
        let records_valid = normalized.records.len();

        let series = extract_deltas(&normalized.records);
        let groups = self.analyze_groups(series);

        let report = AnalysisReport {
            generated_at: Utc::now(),
            bin_size_seconds: self.engine.binning().bin_size(),
            num_bins: self.engine.binning().num_bins(),
            min_timestamp: normalized.min_timestamp,
            records_total,
            records_valid,
            rejected: normalized.rejected,
            groups,
        };

        info!(
            "Analysis complete: {} records ({} rejected), {} groups, {} analyzed, {} excluded",
            report.records_total,
            report.rejected.len(),
            report.groups.len(),
            report.analyzed_groups(),
            report.excluded_groups()
        );

        Ok(report)
    }

    /// Histogram and spectrum for every delta series.
    pub fn analyze_groups(
        &self,
        series: BTreeMap<GroupKey, DeltaSeries>,
    ) -> BTreeMap<GroupKey, GroupAnalysis> {
        if self.parallel {
            debug!("Transforming {} groups on the rayon pool", series.len());
            series
                .into_par_iter()
                .map(|(key, deltas)| (key.clone(), self.analyze_group(key, deltas)))
                .collect()
        } else {
            series
                .into_iter()
                .map(|(key, deltas)| (key.clone(), self.analyze_group(key, deltas)))
                .collect()
        }
    }

    fn analyze_group(&self, key: GroupKey, deltas: DeltaSeries) -> GroupAnalysis {
        let histogram = self.engine.histogram(&deltas);
        let spectrum = if self.is_excluded(&key) {
            None
        } else {
            Some(self.engine.transform(&histogram))
        };

        GroupAnalysis {
            summary: DeltaSummary::from_deltas(&deltas),
            key,
            deltas,
            histogram,
            spectrum,
        }
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::with_binning(Binning::default(), &SpectrumConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::RawTimestamp;
    use proptest::prelude::*;

    fn raw(src: &str, org: &str, port: i64, ts: f64) -> RawFlowRecord {
        RawFlowRecord::new(src, org, port, RawTimestamp::Number(ts))
    }

    fn acme_key() -> GroupKey {
        GroupKey::new("10.0.0.1", "Acme", 443)
    }

    #[test]
    fn test_regular_beacon_scenario() {
        let base = 1_700_000_000.0;
        let records: Vec<_> = [0.0, 600.0, 1200.0, 1800.0]
            .iter()
            .map(|t| raw("10.0.0.1", "Acme", 443, base + t))
            .collect();

        let report = SpectrumAnalyzer::default().analyze(records).unwrap();

        assert_eq!(report.min_timestamp, base);
        let group = &report.groups[&acme_key()];
        assert_eq!(group.deltas, vec![600.0, 600.0, 600.0]);
        assert_eq!(group.histogram.counts(), &[0, 3, 0, 0, 0, 0]);

        let spectrum = group.spectrum.as_ref().unwrap();
        assert!((spectrum.dc().re - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_timestamp_scenario() {
        let records = vec![
            raw("10.0.0.1", "Acme", 443, 0.0),
            RawFlowRecord::new(
                "10.0.0.1",
                "Acme",
                443,
                RawTimestamp::Text("not_a_number".into()),
            ),
            raw("10.0.0.1", "Acme", 443, 600.0),
        ];

        let report = SpectrumAnalyzer::default().analyze(records).unwrap();

        assert_eq!(report.records_total, 3);
        assert_eq!(report.records_valid, 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.groups[&acme_key()].deltas, vec![600.0]);
    }

    #[test]
    fn test_single_record_group_scenario() {
        let report = SpectrumAnalyzer::default()
            .analyze(vec![raw("10.0.0.1", "Acme", 443, 42.0)])
            .unwrap();

        let group = &report.groups[&acme_key()];
        assert!(group.deltas.is_empty());
        assert!(group.summary.is_none());
        assert_eq!(group.histogram.counts(), &[0; 6]);

        let spectrum = group.spectrum.as_ref().unwrap();
        assert!(spectrum.magnitudes().iter().all(|m| m.abs() < 1e-12));
    }

    #[test]
    fn test_unknown_org_is_excluded_scenario() {
        let records = vec![
            raw("10.0.0.1", "N/A", 443, 0.0),
            raw("10.0.0.1", "N/A", 443, 600.0),
            raw("10.0.0.1", "Acme", 443, 0.0),
            raw("10.0.0.1", "Acme", 443, 60.0),
        ];

        let report = SpectrumAnalyzer::default().analyze(records).unwrap();
        let unknown = GroupKey::new("10.0.0.1", "N/A", 443);

        assert_eq!(report.groups[&unknown].histogram.counts(), &[0, 1, 0, 0, 0, 0]);
        assert!(report.groups[&unknown].is_excluded());

        let spectra = report.spectra();
        assert!(!spectra.contains_key(&unknown));
        assert!(spectra.contains_key(&acme_key()));
        assert_eq!(report.histograms().len(), 2);
        assert_eq!(report.analyzed_groups(), 1);
        assert_eq!(report.excluded_groups(), 1);
    }

    #[test]
    fn test_custom_sentinel() {
        let config = SpectrumConfig {
            excluded_dest_org: "unknown".to_string(),
            ..SpectrumConfig::default()
        };
        let analyzer = SpectrumAnalyzer::new(&config).unwrap();

        assert!(analyzer.is_excluded(&GroupKey::new("a", "unknown", 1)));
        assert!(!analyzer.is_excluded(&GroupKey::new("a", "N/A", 1)));
    }

    #[test]
    fn test_new_rejects_invalid_binning() {
        for bin_size_seconds in [0.0, -600.0, f64::NAN, f64::INFINITY] {
            let config = SpectrumConfig {
                bin_size_seconds,
                ..SpectrumConfig::default()
            };
            assert!(matches!(
                SpectrumAnalyzer::new(&config),
                Err(PipelineError::InvalidSettings(_))
            ));
        }

        let config = SpectrumConfig {
            num_bins: 0,
            ..SpectrumConfig::default()
        };
        assert!(matches!(
            SpectrumAnalyzer::new(&config),
            Err(PipelineError::InvalidSettings(_))
        ));

        let analyzer = SpectrumAnalyzer::new(&SpectrumConfig {
            bin_size_seconds: 300.0,
            num_bins: 12,
            ..SpectrumConfig::default()
        })
        .unwrap();
        assert_eq!(analyzer.engine().binning().num_bins(), 12);
        assert_eq!(analyzer.engine().binning().bin_size(), 300.0);
    }

    #[test]
    fn test_empty_valid_input_is_fatal() {
        let records = vec![RawFlowRecord::new(
            "10.0.0.1",
            "Acme",
            443,
            RawTimestamp::Number(-10.0),
        )];

        let result = SpectrumAnalyzer::default().analyze(records);

        assert!(matches!(
            result,
            Err(PipelineError::EmptyValidInput { total: 1 })
        ));
    }

    #[test]
    fn test_delta_summary() {
        let summary = DeltaSummary::from_deltas(&[100.0, 200.0, 300.0, 400.0, 500.0]).unwrap();

        assert_eq!(summary.count, 5);
        assert!((summary.mean - 300.0).abs() < 0.01);
        assert!((summary.min - 100.0).abs() < 0.01);
        assert!((summary.max - 500.0).abs() < 0.01);
        assert!((summary.median - 300.0).abs() < 0.01);
        assert!(summary.std_dev > 0.0);

        let single = DeltaSummary::from_deltas(&[60.0]).unwrap();
        assert_eq!(single.std_dev, 0.0);
        assert!(DeltaSummary::from_deltas(&[]).is_none());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let records: Vec<_> = (0..200)
            .map(|i| {
                raw(
                    &format!("10.0.0.{}", i % 7),
                    ["Acme", "Globex", "N/A"][i % 3],
                    443,
                    (i * 97 % 5000) as f64,
                )
            })
            .collect();

        let sequential = SpectrumAnalyzer::default()
            .analyze(records.clone())
            .unwrap();
        let parallel = SpectrumAnalyzer::new(&SpectrumConfig {
            parallel: true,
            ..SpectrumConfig::default()
        })
        .unwrap()
        .analyze(records)
        .unwrap();

        assert_eq!(sequential.groups.len(), parallel.groups.len());
        for (key, group) in &sequential.groups {
            let other = &parallel.groups[key];
            assert_eq!(group.histogram, other.histogram);
            assert_eq!(group.spectrum, other.spectrum);
        }
    }

    proptest! {
        #[test]
        fn report_laws_hold(
            rows in proptest::collection::vec(
                (0usize..4, 0usize..3, 0.0f64..20_000.0),
                1..120,
            ),
        ) {
            let records: Vec<_> = rows
                .into_iter()
                .map(|(src, org, ts)| {
                    raw(&format!("10.0.0.{}", src), ["Acme", "Globex", "N/A"][org], 443, ts)
                })
                .collect();

            let report = SpectrumAnalyzer::default().analyze(records).unwrap();

            for (key, group) in &report.groups {
                prop_assert!(group.histogram.total() as usize <= group.deltas.len());
                match &group.spectrum {
                    Some(spectrum) => {
                        prop_assert!(key.dst_org != "N/A");
                        prop_assert!(
                            (spectrum.dc().re - group.histogram.total() as f64).abs() < 1e-6
                        );
                    }
                    None => prop_assert_eq!(key.dst_org.as_str(), "N/A"),
                }
            }
        }
    }
}
