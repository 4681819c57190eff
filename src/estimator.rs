//! False-sharing estimation
//!
//! Estimates coherence traffic between the equivalence groups of a cacheline.
//! Writes from group `a` can only hurt accesses of group `b` made by threads
//! that are not already part of `a`'s signature:
//!
//! ```text
//! weight(a -> b) = min(writes(a), reads_and_writes(b, threads not in sig(a)))
//! pair(a, b)     = max(weight(a -> b), weight(b -> a))
//! ```
//!
//! With [`GroupReduction::Max`] each group contributes its worst pair, and the
//! cacheline score is the sum of those maxima. A cacheline with a single
//! group scores 0.

use crate::equivalence::EquivalenceGroup;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How pair weights are reduced to a cacheline score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum GroupReduction {
    /// Sum over groups of the maximum pair weight with any other group
    #[default]
    Max,
    /// Sum of pair weights over every unordered pair of groups
    Sum,
}

/// Directional conflict weight of `a`'s writes on `b`
pub fn conflict_weight(a: &EquivalenceGroup, b: &EquivalenceGroup) -> u64 {
    let writes = a.total_writes();
    let victim = b.rw_excluding(&a.signature).total();
    writes.min(victim)
}

/// Symmetric conflict weight of a pair of groups
pub fn pair_weight(a: &EquivalenceGroup, b: &EquivalenceGroup) -> u64 {
    conflict_weight(a, b).max(conflict_weight(b, a))
}

/// Estimate false-sharing volume for one cacheline's groups
pub fn estimate_false_sharing(groups: &[EquivalenceGroup], reduction: GroupReduction) -> u64 {
    if groups.len() < 2 {
        return 0;
    }

    match reduction {
        GroupReduction::Max => (0..groups.len())
            .map(|i| {
                (0..groups.len())
                    .filter(|&j| j != i)
                    .map(|j| pair_weight(&groups[i], &groups[j]))
                    .max()
                    .unwrap_or(0)
            })
            .sum(),
        GroupReduction::Sum => (0..groups.len())
            .flat_map(|i| ((i + 1)..groups.len()).map(move |j| (i, j)))
            .map(|(i, j)| pair_weight(&groups[i], &groups[j]))
            .sum(),
    }
}
