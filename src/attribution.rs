//! Attribution of access counts to sub-ranges
//!
//! When a record's byte range is cut into several pieces (by cacheline
//! boundaries or by decomposition breakpoints) its read/write counts must be
//! attributed to the pieces somehow. Two policies exist:
//!
//! - [`AttributionPolicy::WholeRecord`]: every piece receives the full counts.
//!   Total volume across pieces exceeds the raw volume whenever a record is
//!   cut. This is the default and keeps the decomposition linear.
//! - [`AttributionPolicy::ExactSplit`]: counts are apportioned by byte length
//!   with largest-remainder rounding, so totals are conserved exactly.

use crate::record::ReadWrite;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How a record spanning several sub-ranges is attributed to them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AttributionPolicy {
    /// Attribute the full counts to every overlapped sub-range
    #[default]
    WholeRecord,
    /// Apportion counts by overlapped byte length (conserves totals)
    ExactSplit,
}

impl AttributionPolicy {
    /// Distribute `rw` over pieces of the given byte lengths
    ///
    /// The result has one entry per piece, in the same order.
    pub fn distribute(self, rw: ReadWrite, lengths: &[u64]) -> Vec<ReadWrite> {
        match self {
            AttributionPolicy::WholeRecord => vec![rw; lengths.len()],
            AttributionPolicy::ExactSplit => {
                let reads = apportion(rw.reads, lengths);
                let writes = apportion(rw.writes, lengths);
                reads
                    .into_iter()
                    .zip(writes)
                    .map(|(r, w)| ReadWrite::new(r, w))
                    .collect()
            }
        }
    }

    /// Whether aggregated totals equal raw totals under this policy
    pub fn conserves_totals(self) -> bool {
        matches!(self, AttributionPolicy::ExactSplit)
    }
}

/// Split `total` proportionally to `weights` using largest remainders
///
/// The parts always sum to `total` (when any weight is non-zero). Ties on the
/// remainder go to the earlier piece.
pub fn apportion(total: u64, weights: &[u64]) -> Vec<u64> {
    let weight_sum: u128 = weights.iter().map(|&w| u128::from(w)).sum();
    if weights.is_empty() {
        return Vec::new();
    }
    if weight_sum == 0 {
        let mut parts = vec![0; weights.len()];
        parts[0] = total;
        return parts;
    }

    let total = u128::from(total);
    let mut parts = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for (index, &weight) in weights.iter().enumerate() {
        let scaled = total * u128::from(weight);
        parts.push((scaled / weight_sum) as u64);
        remainders.push((scaled % weight_sum, index));
    }

    let assigned: u128 = parts.iter().map(|&p| u128::from(p)).sum();
    let leftover = (total - assigned) as usize;
    // Largest remainder first, earlier piece on ties
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for &(_, index) in remainders.iter().take(leftover) {
        parts[index] += 1;
    }
    parts
}
