// Per-allocation aggregation of cacheline scores

use super::analysis::CachelineAnalysis;
use crate::allocation::{AllocationResolver, MallocId};
use crate::record::CodeLocation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accumulated false-sharing evidence for one heap allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub malloc_id: MallocId,
    /// Allocation call site, when the table records one
    pub site: Option<CodeLocation>,
    /// Allocation size in bytes, when known
    pub size: Option<u64>,
    /// Offsets of sub-ranges inside the allocation with occurrence counts
    pub offsets: BTreeMap<u64, usize>,
    /// Retained cachelines touching the allocation
    pub cachelines: usize,
    /// Sum of the scores of those cachelines
    pub total_score: u64,
}

impl AllocationSummary {
    fn new(malloc_id: MallocId) -> Self {
        Self {
            malloc_id,
            site: None,
            size: None,
            offsets: BTreeMap::new(),
            cachelines: 0,
            total_score: 0,
        }
    }

    pub fn distinct_offsets(&self) -> usize {
        self.offsets.len()
    }
}

/// Add each cacheline's score to every allocation it touches
///
/// A cacheline straddling an allocation boundary contributes its full score
/// to each allocation. Results are ordered by total score, highest first,
/// then by allocation id.
pub fn aggregate_by_allocation<R>(
    analyses: &[CachelineAnalysis],
    resolver: &R,
) -> Vec<AllocationSummary>
where
    R: AllocationResolver + ?Sized,
{
    let mut by_id: BTreeMap<MallocId, AllocationSummary> = BTreeMap::new();

    for analysis in analyses {
        for ar in analysis.addr_records() {
            if let Some(alloc) = ar.allocation() {
                let summary = by_id
                    .entry(alloc.malloc_id)
                    .or_insert_with(|| AllocationSummary::new(alloc.malloc_id));
                *summary.offsets.entry(alloc.offset).or_default() += 1;
            }
        }
        for malloc_id in analysis.allocations() {
            if let Some(summary) = by_id.get_mut(&malloc_id) {
                summary.cachelines += 1;
                summary.total_score += analysis.score;
            }
        }
    }

    let mut summaries: Vec<AllocationSummary> = by_id
        .into_values()
        .map(|mut summary| {
            if let Some(alloc) = resolver.describe(summary.malloc_id) {
                summary.site = alloc.site;
                summary.size = Some(alloc.size);
            }
            summary
        })
        .collect();
    summaries.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then(a.malloc_id.cmp(&b.malloc_id))
    });
    summaries
}
