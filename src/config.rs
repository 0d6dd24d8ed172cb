//! Configuration Module
//!
//! Provides TOML-based configuration for beacon-spectrum.
//! Configuration is optional - CLI arguments can override file settings.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::export::OutputFormat;
use crate::flow::UNRESOLVED_ORG;
use crate::input::InputFormat;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub spectrum: SpectrumConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Loads configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Generates a default configuration file content
    pub fn generate_default() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| "# Failed to generate config".to_string())
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        let spectrum = &self.spectrum;
        if !spectrum.bin_size_seconds.is_finite() || spectrum.bin_size_seconds <= 0.0 {
            anyhow::bail!("bin_size_seconds must be a positive number");
        }
        if spectrum.num_bins == 0 {
            anyhow::bail!("num_bins must be greater than 0");
        }
        if spectrum.excluded_dest_org.is_empty() {
            anyhow::bail!("excluded_dest_org must not be empty");
        }
        Ok(())
    }
}

/// Binning and filtering configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Width of one histogram bin in seconds
    pub bin_size_seconds: f64,
    /// Number of histogram bins (and DFT length)
    pub num_bins: usize,
    /// Destination org value marking an unresolved organization
    pub excluded_dest_org: String,
    /// Transform groups on the rayon thread pool
    pub parallel: bool,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            bin_size_seconds: 600.0, // 10 minutes
            num_bins: 6,
            excluded_dest_org: UNRESOLVED_ORG.to_string(),
            parallel: false,
        }
    }
}

/// Input-related configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    /// Input format (parquet, json, jsonl); inferred from the extension when unset
    #[serde(with = "input_format_serde")]
    pub format: Option<InputFormat>,
}

/// Output-related configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format (text, json, jsonl)
    #[serde(with = "output_format_serde")]
    pub format: OutputFormat,
    /// Output file path (None = stdout)
    pub file: Option<String>,
    /// Enable verbose logging
    pub verbose: bool,
    /// Also list groups excluded from the spectrum stage
    pub include_excluded: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            file: None,
            verbose: false,
            include_excluded: false,
        }
    }
}

/// Custom serde implementation for OutputFormat
mod output_format_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(format: &OutputFormat, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OutputFormat, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Custom serde implementation for an optional InputFormat ("auto" = None)
mod input_format_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(format: &Option<InputFormat>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match format {
            Some(f) => serializer.serialize_str(&f.to_string()),
            None => serializer.serialize_str("auto"),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<InputFormat>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.eq_ignore_ascii_case("auto") {
            return Ok(None);
        }
        s.parse().map(Some).map_err(serde::de::Error::custom)
    }
}
