//! Counted filtering of analysis results
//!
//! Every filter stage reports how many items it removed next to the retained
//! list, so nothing is ever dropped silently.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Items that survived a filter stage plus the number removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOutcome<T> {
    pub retained: Vec<T>,
    pub removed: usize,
}

/// Keep items matching `keep`, counting the rest
pub fn retain_counted<T, F>(items: Vec<T>, mut keep: F) -> FilterOutcome<T>
where
    F: FnMut(&T) -> bool,
{
    let before = items.len();
    let retained: Vec<T> = items.into_iter().filter(|item| keep(item)).collect();
    let removed = before - retained.len();
    FilterOutcome { retained, removed }
}

/// Filter stages applied to per-cacheline results, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterStage {
    /// Cacheline touched by a single thread
    SingleThreaded,
    /// Cacheline with one equivalence group (no conflict possible)
    SingleGroup,
    /// Score under the configured minimum significance
    BelowThreshold,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FilterStage::SingleThreaded => "single threaded",
            FilterStage::SingleGroup => "single equivalence group",
            FilterStage::BelowThreshold => "below score threshold",
        };
        f.write_str(text)
    }
}

/// Cacheline counts before, during and after filtering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub total: usize,
    pub single_threaded: usize,
    pub single_group: usize,
    pub below_threshold: usize,
    pub remaining: usize,
}

impl FilterSummary {
    /// Count removed by a given stage
    pub fn removed_by(&self, stage: FilterStage) -> usize {
        match stage {
            FilterStage::SingleThreaded => self.single_threaded,
            FilterStage::SingleGroup => self.single_group,
            FilterStage::BelowThreshold => self.below_threshold,
        }
    }

    pub fn record(&mut self, stage: FilterStage, removed: usize) {
        match stage {
            FilterStage::SingleThreaded => self.single_threaded += removed,
            FilterStage::SingleGroup => self.single_group += removed,
            FilterStage::BelowThreshold => self.below_threshold += removed,
        }
        tracing::debug!("filter '{}' removed {} cachelines", stage, removed);
    }

    /// Every cacheline is either removed by exactly one stage or remains
    pub fn is_consistent(&self) -> bool {
        self.single_threaded + self.single_group + self.below_threshold + self.remaining
            == self.total
    }
}
