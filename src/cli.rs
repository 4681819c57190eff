//! CLI argument parsing for cacheshare

use crate::attribution::AttributionPolicy;
use crate::estimator::GroupReduction;
use crate::ingest::RecordShape;
use crate::pipeline::AnalysisConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for false-sharing reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

#[derive(Parser, Debug)]
#[command(name = "cacheshare")]
#[command(version)]
#[command(about = "Cacheline false-sharing detection over memory access traces", long_about = None)]
pub struct Cli {
    /// Memory access trace (CSV rows)
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Heap allocation table (malloc_id, start, size[, function_id, instruction_id])
    #[arg(short = 'a', long = "allocations", value_name = "FILE")]
    pub allocations: Option<PathBuf>,

    /// Analysis configuration file (TOML)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Trace row shape (overrides config)
    #[arg(long = "record-shape", value_enum)]
    pub record_shape: Option<RecordShape>,

    /// Attribution of counts to sub-ranges (overrides config)
    #[arg(long = "attribution", value_enum)]
    pub attribution: Option<AttributionPolicy>,

    /// Reduction of pair weights to a cacheline score (overrides config)
    #[arg(long = "reduction", value_enum)]
    pub reduction: Option<GroupReduction>,

    /// Minimum score for a cacheline to be reported (default: 20)
    #[arg(long = "min-score", value_name = "N")]
    pub min_score: Option<u64>,

    /// Analyse cachelines in parallel
    #[arg(long = "parallel")]
    pub parallel: bool,

    /// Worker threads for --parallel (default: one per core)
    #[arg(long = "threads", value_name = "N", requires = "parallel")]
    pub threads: Option<usize>,

    /// Output format (text, json or csv)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Enable debug tracing output on stderr
    #[arg(long = "debug")]
    pub debug: bool,
}

impl Cli {
    /// Apply command-line overrides on top of a loaded configuration
    pub fn apply_overrides(&self, config: &mut AnalysisConfig) {
        if let Some(shape) = self.record_shape {
            config.record_shape = shape;
        }
        if let Some(attribution) = self.attribution {
            config.attribution = attribution;
        }
        if let Some(reduction) = self.reduction {
            config.reduction = reduction;
        }
        if let Some(min_score) = self.min_score {
            config.min_score = min_score;
        }
        if self.parallel {
            config.parallel = true;
        }
        if self.threads.is_some() {
            config.threads = self.threads;
        }
    }
}
