//! beacon-spectrum: periodicity analysis of network flow records.
//!
//! Periodic "beaconing" (for example malware check-ins) shows up as a stable
//! inter-arrival time between a host and a destination. This tool groups flow
//! records by (source, destination org, destination port), bins the
//! inter-arrival deltas of each group into a fixed-width histogram and takes
//! the DFT of that histogram.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────┐   ┌───────────┐   ┌─────────┐   ┌────────────┐   ┌─────────┐
//! │  Input  │──>│ Normalize │──>│ Deltas  │──>│ Histogram  │──>│ Export  │
//! │ (files) │   │  (flow)   │   │         │   │  + DFT     │   │         │
//! └─────────┘   └───────────┘   └─────────┘   └────────────┘   └─────────┘
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use beacon_spectrum::analyzer::SpectrumAnalyzer;
use beacon_spectrum::config::Config;
use beacon_spectrum::export::{describe_summary, export_report, ExportOptions, OutputFormat};
use beacon_spectrum::input::{load_records, InputFormat};

/// beacon-spectrum: beacon detection through inter-arrival spectra.
#[derive(Parser, Debug)]
#[command(name = "beacon-spectrum")]
#[command(version)]
#[command(about = "Detect periodic beaconing via inter-arrival histograms and DFT")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a batch of flow records.
    Analyze {
        /// Path to the flow records (.parquet, .json or .jsonl).
        #[arg(short, long)]
        input: PathBuf,

        /// Input format: parquet, json, jsonl (default: from extension).
        #[arg(long)]
        input_format: Option<InputFormat>,

        /// Path to a TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Histogram bin width in seconds.
        #[arg(short, long)]
        bin_size: Option<f64>,

        /// Number of histogram bins.
        #[arg(short, long)]
        num_bins: Option<usize>,

        /// Destination org value excluded from the spectrum stage.
        #[arg(long)]
        exclude_org: Option<String>,

        /// Transform groups in parallel.
        #[arg(long)]
        parallel: bool,

        /// Output format: text, json, jsonl.
        #[arg(short = 'f', long)]
        output_format: Option<OutputFormat>,

        /// Write the report to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// List excluded groups (histogram only) in the report.
        #[arg(long)]
        include_excluded: bool,

        /// Enable verbose logging (writes to stderr).
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print a default configuration file.
    GenerateConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            input_format,
            config,
            bin_size,
            num_bins,
            exclude_org,
            parallel,
            output_format,
            output,
            include_excluded,
            verbose,
        } => {
            let mut config = match config.as_deref() {
                Some(path) => Config::load(path)?,
                None => Config::default(),
            };

            // CLI flags override file settings
            if let Some(bin_size) = bin_size {
                config.spectrum.bin_size_seconds = bin_size;
            }
            if let Some(num_bins) = num_bins {
                config.spectrum.num_bins = num_bins;
            }
            if let Some(org) = exclude_org {
                config.spectrum.excluded_dest_org = org;
            }
            if input_format.is_some() {
                config.input.format = input_format;
            }
            if let Some(format) = output_format {
                config.output.format = format;
            }
            if let Some(path) = output {
                config.output.file = Some(path.display().to_string());
            }
            config.spectrum.parallel |= parallel;
            config.output.include_excluded |= include_excluded;
            config.output.verbose |= verbose;

            init_logging(config.output.verbose)?;
            config.validate()?;

            run_analysis(&input, &config)
        }

        Commands::GenerateConfig => {
            println!("{}", Config::generate_default());
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

fn run_analysis(input: &std::path::Path, config: &Config) -> Result<()> {
    let records = load_records(input, config.input.format)?;

    let analyzer = SpectrumAnalyzer::new(&config.spectrum)?;
    let report = analyzer
        .analyze(records)
        .context("Spectrum analysis failed")?;

    for group in report.groups.values() {
        debug!(
            "{}: {}, bins {:?}",
            group.key,
            describe_summary(group.summary.as_ref()),
            group.histogram.counts()
        );
    }

    let options = ExportOptions {
        include_excluded: config.output.include_excluded,
    };
    let rendered = export_report(&report, config.output.format, options);

    match &config.output.file {
        Some(path) => {
            std::fs::write(path, format!("{}\n", rendered))
                .with_context(|| format!("Failed to write report: {}", path))?;
            info!("Report written to {}", path);
        }
        None => println!("{}", rendered),
    }

    Ok(())
}
