// Per-cacheline analysis: decompose, group, score

use super::config::AnalysisConfig;
use crate::allocation::{AllocationResolver, MallocId};
use crate::cacheline::CachelineGroup;
use crate::decompose::{decompose, verify_conservation, verify_coverage, AddrRecord};
use crate::equivalence::{group_by_signature, EquivalenceGroup};
use crate::error::Result;
use crate::estimator::estimate_false_sharing;
use crate::record::{CachelineId, ThreadId};
use std::collections::BTreeSet;

/// Analysis result for one cacheline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachelineAnalysis {
    pub cacheline_id: CachelineId,
    /// Distinct threads that touched the line
    pub threads: BTreeSet<ThreadId>,
    /// Equivalence groups, sorted by signature
    pub groups: Vec<EquivalenceGroup>,
    /// Estimated false-sharing volume
    pub score: u64,
}

impl CachelineAnalysis {
    /// All sub-ranges share one access pattern, so no conflict is detectable
    pub fn is_complete_graph(&self) -> bool {
        self.groups.len() == 1
    }

    /// Sub-ranges of every group
    pub fn addr_records(&self) -> impl Iterator<Item = &AddrRecord> {
        self.groups.iter().flat_map(|g| g.members.iter())
    }

    pub fn sub_range_count(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }

    /// Distinct allocations touched by any sub-range
    pub fn allocations(&self) -> BTreeSet<MallocId> {
        self.addr_records()
            .filter_map(|ar| ar.allocation().map(|a| a.malloc_id))
            .collect()
    }
}

/// Run decomposition, grouping and scoring for one cacheline
pub fn analyze_cacheline<R>(
    group: &CachelineGroup,
    config: &AnalysisConfig,
    resolver: &R,
) -> Result<CachelineAnalysis>
where
    R: AllocationResolver + ?Sized,
{
    let addr_records = decompose(group, config.attribution, resolver)?;

    if config.verify_invariants {
        verify_coverage(group, &addr_records)?;
        if config.attribution.conserves_totals() {
            verify_conservation(group, &addr_records)?;
        }
    }

    let groups = group_by_signature(addr_records);
    let score = estimate_false_sharing(&groups, config.reduction);

    Ok(CachelineAnalysis {
        cacheline_id: group.id,
        threads: group.threads(),
        groups,
        score,
    })
}
