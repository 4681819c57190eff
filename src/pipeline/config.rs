// Configuration for the false-sharing analysis pipeline
//
// Every knob that used to distinguish one revision of the analysis from
// another is a named option here: record shape, attribution policy, group
// reduction rule and filter threshold.

use crate::attribution::AttributionPolicy;
use crate::error::{CacheshareError, Result};
use crate::estimator::GroupReduction;
use crate::ingest::RecordShape;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Minimum score (read/write volume) for a cacheline to be reported
pub const DEFAULT_MIN_SCORE: u64 = 20;

/// Configuration for cacheline analysis
///
/// # Example
/// ```
/// use cacheshare::pipeline::AnalysisConfig;
///
/// let config = AnalysisConfig::default();
/// assert_eq!(config.min_score, 20);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Trace row shape (auto-detected per row by default)
    pub record_shape: RecordShape,

    /// Attribution of records spanning several sub-ranges
    ///
    /// Whole-record attribution over-counts volume when records are cut but
    /// keeps decomposition linear; exact-split conserves totals.
    pub attribution: AttributionPolicy,

    /// Reduction of pair weights to one score per cacheline
    pub reduction: GroupReduction,

    /// Cachelines scoring below this are filtered out
    pub min_score: u64,

    /// Analyse cachelines on a rayon thread pool
    pub parallel: bool,

    /// Worker count for parallel analysis (rayon default when unset)
    pub threads: Option<usize>,

    /// Check coverage (and conservation under exact-split) per cacheline
    pub verify_invariants: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            record_shape: RecordShape::Auto,
            attribution: AttributionPolicy::WholeRecord,
            reduction: GroupReduction::Max,
            min_score: DEFAULT_MIN_SCORE,
            parallel: false,
            threads: None,
            verify_invariants: true,
        }
    }
}

impl AnalysisConfig {
    /// Exact-split attribution: totals are conserved and verified
    pub fn exact() -> Self {
        Self {
            attribution: AttributionPolicy::ExactSplit,
            verify_invariants: true,
            ..Self::default()
        }
    }

    /// Traces from the legacy runtime that only log a write flag per access
    pub fn legacy_trace() -> Self {
        Self {
            record_shape: RecordShape::WriteFlag,
            ..Self::default()
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AnalysisConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    ///
    /// # Example TOML
    /// ```toml
    /// attribution = "exact-split"
    /// reduction = "max"
    /// min_score = 50
    /// parallel = true
    /// threads = 4
    /// ```
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.threads {
            Some(0) => Err(CacheshareError::InvalidConfig(
                "threads must be at least 1".to_string(),
            )),
            Some(n) if !self.parallel => Err(CacheshareError::InvalidConfig(format!(
                "threads = {} requires parallel = true",
                n
            ))),
            _ => Ok(()),
        }
    }
}
