//! Group-wise inter-arrival delta extraction.
//!
//! For a group with timestamps [t₀, t₁, ..., tₙ] the series is
//! Δᵢ = tᵢ - tᵢ₋₁ for i ∈ [1, n]. The extractor walks records that are
//! already sorted by key then time, so it is a single linear pass.

use std::collections::BTreeMap;

use tracing::debug;

use crate::flow::{FlowRecord, GroupKey};

/// Consecutive inter-arrival gaps (seconds) of one group, in chronological order.
pub type DeltaSeries = Vec<f64>;

/// Outcome of feeding one record to a [`GroupCursor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// First record of a group; nothing to subtract from.
    NewGroup,
    /// Same group as the previous record, with the gap since that record.
    Continue(f64),
}

/// Fold state of the extractor: which group is open and when it last fired.
#[derive(Debug, Clone, Default)]
pub struct GroupCursor {
    current_key: Option<GroupKey>,
    previous_timestamp: f64,
}

impl GroupCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances over `record`, which must not sort before the previous one.
    pub fn advance(&mut self, record: &FlowRecord) -> Step {
        let step = match &self.current_key {
            Some(key) if *key == record.key => {
                Step::Continue(record.first_seen - self.previous_timestamp)
            }
            _ => {
                self.current_key = Some(record.key.clone());
                Step::NewGroup
            }
        };
        self.previous_timestamp = record.first_seen;
        step
    }

    pub fn current_key(&self) -> Option<&GroupKey> {
        self.current_key.as_ref()
    }
}

/// Builds the delta series of every group from key/time sorted records.
///
/// Every group present in `records` gets an entry, so a single-record group
/// maps to an empty series.
pub fn extract_deltas(records: &[FlowRecord]) -> BTreeMap<GroupKey, DeltaSeries> {
    let mut cursor = GroupCursor::new();
    let mut series: BTreeMap<GroupKey, DeltaSeries> = BTreeMap::new();

    for record in records {
        match cursor.advance(record) {
            Step::NewGroup => {
                series.entry(record.key.clone()).or_default();
            }
            Step::Continue(delta) => {
                debug_assert!(delta >= 0.0, "records must be sorted by key then time");
                if let Some(deltas) = series.get_mut(&record.key) {
                    deltas.push(delta);
                }
            }
        }
    }

    debug!(
        "Extracted deltas for {} groups from {} records",
        series.len(),
        records.len()
    );

    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{normalize, RawFlowRecord, RawTimestamp};
    use proptest::prelude::*;

    fn flow(src: &str, org: &str, port: u16, ts: f64) -> FlowRecord {
        FlowRecord {
            key: GroupKey::new(src, org, port),
            first_seen: ts,
        }
    }

    #[test]
    fn test_cursor_state_machine() {
        let mut cursor = GroupCursor::new();
        assert!(cursor.current_key().is_none());

        assert_eq!(cursor.advance(&flow("a", "Acme", 443, 0.0)), Step::NewGroup);
        assert_eq!(
            cursor.advance(&flow("a", "Acme", 443, 600.0)),
            Step::Continue(600.0)
        );
        // Any field change opens a new group
        assert_eq!(cursor.advance(&flow("a", "Acme", 80, 650.0)), Step::NewGroup);
        assert_eq!(cursor.advance(&flow("a", "Other", 80, 700.0)), Step::NewGroup);
        assert_eq!(cursor.advance(&flow("b", "Other", 80, 900.0)), Step::NewGroup);
        assert_eq!(
            cursor.current_key(),
            Some(&GroupKey::new("b", "Other", 80))
        );
    }

    #[test]
    fn test_regular_beacon_deltas() {
        let records: Vec<FlowRecord> = [0.0, 600.0, 1200.0, 1800.0]
            .iter()
            .map(|&ts| flow("10.0.0.1", "Acme", 443, ts))
            .collect();

        let series = extract_deltas(&records);

        assert_eq!(series.len(), 1);
        assert_eq!(
            series[&GroupKey::new("10.0.0.1", "Acme", 443)],
            vec![600.0, 600.0, 600.0]
        );
    }

    #[test]
    fn test_single_record_group_has_empty_series() {
        let records = vec![
            flow("10.0.0.1", "Acme", 443, 0.0),
            flow("10.0.0.1", "Acme", 443, 10.0),
            flow("10.0.0.2", "Acme", 443, 5.0),
        ];

        let series = extract_deltas(&records);

        assert_eq!(series[&GroupKey::new("10.0.0.1", "Acme", 443)], vec![10.0]);
        assert!(series[&GroupKey::new("10.0.0.2", "Acme", 443)].is_empty());
    }

    #[test]
    fn test_duplicate_timestamps_give_zero_delta() {
        let records = vec![
            flow("10.0.0.1", "Acme", 443, 30.0),
            flow("10.0.0.1", "Acme", 443, 30.0),
        ];

        let series = extract_deltas(&records);

        assert_eq!(series[&GroupKey::new("10.0.0.1", "Acme", 443)], vec![0.0]);
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_deltas(&[]).is_empty());
    }

    fn raw_records() -> impl Strategy<Value = Vec<RawFlowRecord>> {
        proptest::collection::vec(
            (0usize..3, 0usize..2, 0u16..3, 0.0f64..100_000.0),
            1..80,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(src, org, port, ts)| {
                    RawFlowRecord::new(
                        format!("10.0.0.{}", src),
                        ["Acme", "N/A"][org],
                        i64::from(port),
                        RawTimestamp::Number(ts),
                    )
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn deltas_are_non_negative_and_sum_to_span(raw in raw_records()) {
            let normalized = normalize(raw).unwrap();
            let series = extract_deltas(&normalized.records);

            for (key, deltas) in &series {
                prop_assert!(deltas.iter().all(|d| *d >= 0.0));

                let times: Vec<f64> = normalized
                    .records
                    .iter()
                    .filter(|r| &r.key == key)
                    .map(|r| r.first_seen)
                    .collect();
                prop_assert_eq!(deltas.len(), times.len() - 1);

                if times.len() >= 2 {
                    let span = times.iter().cloned().fold(f64::MIN, f64::max)
                        - times.iter().cloned().fold(f64::MAX, f64::min);
                    let sum: f64 = deltas.iter().sum();
                    prop_assert!((sum - span).abs() < 1e-6, "sum {} != span {}", sum, span);
                }
            }
        }
    }
}
