//! Histogram binning and frequency-domain transform.
//!
//! # Method
//!
//! ## Binning
//! A delta `d` lands in bin `floor(d / bin_size)`. Bins cover
//! `[0, num_bins * bin_size)`; anything at or beyond the window edge is
//! dropped. With the defaults (600 s, 6 bins) the window is one hour.
//!
//! ## Transform
//! The histogram `h` of length N is transformed with the DFT
//! Xₖ = Σₙ hₙ · e^(-2πi·kn/N). X₀ is the DC term and equals Σ hₙ.
//! A beacon with a stable period piles its deltas into one bin, which shows up
//! as a flat, high magnitude across all frequencies.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Where a delta falls relative to the observation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinPlacement {
    Bin(usize),
    /// At or beyond `num_bins * bin_size`; not an error, just unobserved.
    OutOfWindow,
}

/// Fixed-width linear binning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Binning {
    bin_size: f64,
    num_bins: usize,
}

impl Binning {
    /// `bin_size` must be finite and positive, `num_bins` non-zero
    /// (enforced by `SpectrumAnalyzer::new`).
    pub fn new(bin_size: f64, num_bins: usize) -> Self {
        debug_assert!(bin_size.is_finite() && bin_size > 0.0);
        debug_assert!(num_bins > 0);
        Self { bin_size, num_bins }
    }

    pub fn bin_size(&self) -> f64 {
        self.bin_size
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Span covered by all bins, in seconds.
    pub fn window(&self) -> f64 {
        self.bin_size * self.num_bins as f64
    }

    /// Floors `delta` to its bin index.
    pub fn place(&self, delta: f64) -> BinPlacement {
        let index = (delta / self.bin_size).floor();
        if index >= 0.0 && index < self.num_bins as f64 {
            BinPlacement::Bin(index as usize)
        } else {
            BinPlacement::OutOfWindow
        }
    }

    /// Counts `deltas` into a histogram, skipping out-of-window values.
    pub fn histogram(&self, deltas: &[f64]) -> Histogram {
        let mut counts = vec![0u64; self.num_bins];
        for &delta in deltas {
            match self.place(delta) {
                BinPlacement::Bin(i) => counts[i] += 1,
                BinPlacement::OutOfWindow => {
                    trace!("Delta {:.3}s outside {:.0}s window", delta, self.window());
                }
            }
        }
        Histogram { counts }
    }
}

impl Default for Binning {
    fn default() -> Self {
        Self::new(600.0, 6)
    }
}

/// Bin counts for one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    counts: Vec<u64>,
}

impl Histogram {
    pub fn from_counts(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// DFT coefficients of a histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    coefficients: Vec<Complex<f64>>,
}

impl Spectrum {
    pub fn coefficients(&self) -> &[Complex<f64>] {
        &self.coefficients
    }

    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Zero-frequency coefficient; its real part is the histogram total.
    pub fn dc(&self) -> Complex<f64> {
        self.coefficients.first().copied().unwrap_or_default()
    }

    /// `|Xₖ|` for every frequency bin.
    pub fn magnitudes(&self) -> Vec<f64> {
        self.coefficients.iter().map(|c| c.norm()).collect()
    }
}

/// Forward and inverse DFT planned once for a fixed histogram length.
#[derive(Clone)]
pub struct SpectrumEngine {
    binning: Binning,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl SpectrumEngine {
    pub fn new(binning: Binning) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(binning.num_bins());
        let inverse = planner.plan_fft_inverse(binning.num_bins());
        Self {
            binning,
            forward,
            inverse,
        }
    }

    pub fn binning(&self) -> &Binning {
        &self.binning
    }

    /// Bins a delta series.
    pub fn histogram(&self, deltas: &[f64]) -> Histogram {
        self.binning.histogram(deltas)
    }

    /// Transforms a histogram of length `num_bins` into its spectrum.
    pub fn transform(&self, histogram: &Histogram) -> Spectrum {
        debug_assert_eq!(histogram.len(), self.binning.num_bins());
        let mut buffer: Vec<Complex<f64>> = histogram
            .counts()
            .iter()
            .map(|&c| Complex::new(c as f64, 0.0))
            .collect();
        self.forward.process(&mut buffer);
        Spectrum {
            coefficients: buffer,
        }
    }

    /// Reconstructs bin values from a spectrum (real parts, scaled by 1/N).
    pub fn inverse(&self, spectrum: &Spectrum) -> Vec<f64> {
        let mut buffer = spectrum.coefficients.clone();
        self.inverse.process(&mut buffer);
        let scale = buffer.len() as f64;
        buffer.iter().map(|c| c.re / scale).collect()
    }
}

impl std::fmt::Debug for SpectrumEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumEngine")
            .field("binning", &self.binning)
            .finish()
    }
}
