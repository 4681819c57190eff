//! False-sharing analysis pipeline
//!
//! Runs the whole batch computation over an ingested trace:
//!
//! ```text
//! records -> group by cacheline -> drop single-threaded
//!         -> per cacheline: decompose -> group by signature -> score
//!         -> drop single-group -> drop below threshold
//!         -> aggregate per allocation
//! ```
//!
//! Cacheline analyses are independent of each other and only share the
//! read-only allocation resolver, so they can run on a rayon pool. Results
//! are collected in cacheline order either way, which keeps the output
//! identical to a sequential run.

mod aggregate;
mod analysis;
mod config;

pub use aggregate::{aggregate_by_allocation, AllocationSummary};
pub use analysis::{analyze_cacheline, CachelineAnalysis};
pub use config::{AnalysisConfig, DEFAULT_MIN_SCORE};

use crate::allocation::AllocationResolver;
use crate::cacheline::{filter_single_threaded, group_by_cacheline, CachelineGroup};
use crate::error::{CacheshareError, Result};
use crate::filter::{retain_counted, FilterStage, FilterSummary};
use crate::record::AccessRecord;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};

/// Score statistics over the retained cachelines
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreStats {
    pub total: u64,
    pub max: u64,
    /// `None` when no cacheline survived filtering
    pub mean: Option<f64>,
}

impl ScoreStats {
    pub fn from_analyses(analyses: &[CachelineAnalysis]) -> Self {
        let total: u64 = analyses.iter().map(|a| a.score).sum();
        let max = analyses.iter().map(|a| a.score).max().unwrap_or(0);
        let mean = if analyses.is_empty() {
            None
        } else {
            Some(total as f64 / analyses.len() as f64)
        };
        Self { total, max, mean }
    }
}

/// Complete result of one analysis run
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub summary: FilterSummary,
    /// Retained cachelines, ordered by cacheline id
    pub cachelines: Vec<CachelineAnalysis>,
    /// Per-allocation totals, highest score first
    pub allocations: Vec<AllocationSummary>,
    pub stats: ScoreStats,
}

/// Analyse a full trace
///
/// # Example
/// ```
/// use cacheshare::allocation::NoAllocations;
/// use cacheshare::pipeline::{analyze, AnalysisConfig};
/// use cacheshare::record::{AccessRecord, CodeLocation};
///
/// let records = vec![
///     AccessRecord::new(0, 0, 8, 0, 50, CodeLocation::new(1, 1)),
///     AccessRecord::new(1, 8, 8, 30, 20, CodeLocation::new(1, 2)),
/// ];
/// let report = analyze(&records, &NoAllocations, &AnalysisConfig::default()).unwrap();
/// assert_eq!(report.cachelines.len(), 1);
/// assert_eq!(report.cachelines[0].score, 100);
/// ```
pub fn analyze<R>(
    records: &[AccessRecord],
    resolver: &R,
    config: &AnalysisConfig,
) -> Result<AnalysisReport>
where
    R: AllocationResolver + ?Sized,
{
    config.validate()?;

    let groups = group_by_cacheline(records, config.attribution);
    let mut summary = FilterSummary {
        total: groups.len(),
        ..FilterSummary::default()
    };

    let multi_threaded = filter_single_threaded(groups);
    summary.record(FilterStage::SingleThreaded, multi_threaded.removed);

    let analyses = analyze_all(&multi_threaded.retained, config, resolver)?;

    let conflicting = retain_counted(analyses, |a| !a.is_complete_graph());
    summary.record(FilterStage::SingleGroup, conflicting.removed);

    let significant = retain_counted(conflicting.retained, |a| a.score >= config.min_score);
    summary.record(FilterStage::BelowThreshold, significant.removed);

    let cachelines = significant.retained;
    summary.remaining = cachelines.len();
    debug_assert!(summary.is_consistent());

    let allocations = aggregate_by_allocation(&cachelines, resolver);
    let stats = ScoreStats::from_analyses(&cachelines);

    tracing::info!(
        "{} cachelines analysed, {} remain ({} allocations implicated)",
        summary.total,
        summary.remaining,
        allocations.len()
    );

    Ok(AnalysisReport {
        summary,
        cachelines,
        allocations,
        stats,
    })
}

fn analyze_all<R>(
    groups: &[CachelineGroup],
    config: &AnalysisConfig,
    resolver: &R,
) -> Result<Vec<CachelineAnalysis>>
where
    R: AllocationResolver + ?Sized,
{
    if !config.parallel {
        return groups
            .iter()
            .map(|g| analyze_cacheline(g, config, resolver))
            .collect();
    }

    let run = || {
        groups
            .par_iter()
            .map(|g| analyze_cacheline(g, config, resolver))
            .collect::<Result<Vec<_>>>()
    };

    match config.threads {
        Some(threads) => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| CacheshareError::InvalidConfig(e.to_string()))?;
            pool.install(run)
        }
        None => run(),
    }
}

#[cfg(test)]
mod tests;
