//! Periodicity ("beaconing") analysis of network flow records.
//!
//! The pipeline groups raw flow records by (source, destination org,
//! destination port), extracts chronological inter-arrival deltas per group,
//! bins them into a fixed-width histogram and takes the DFT of each histogram.
//!
//! ```no_run
//! use beacon_spectrum::analyzer::SpectrumAnalyzer;
//! use beacon_spectrum::flow::{RawFlowRecord, RawTimestamp};
//!
//! let records = vec![
//!     RawFlowRecord::new("10.0.0.1", "Acme", 443, RawTimestamp::Number(0.0)),
//!     RawFlowRecord::new("10.0.0.1", "Acme", 443, RawTimestamp::Number(600.0)),
//! ];
//! let report = SpectrumAnalyzer::default().analyze(records)?;
//! for (key, spectrum) in report.spectra() {
//!     println!("{}: {:?}", key, spectrum.magnitudes());
//! }
//! # Ok::<(), beacon_spectrum::error::PipelineError>(())
//! ```

pub mod analyzer;
pub mod config;
pub mod deltas;
pub mod error;
pub mod export;
pub mod flow;
pub mod input;
pub mod spectrum;
