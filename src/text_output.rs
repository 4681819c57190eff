//! Human-readable report
//!
//! Retained cachelines with their equivalence groups, allocation totals,
//! then the filter summary block.

use crate::pipeline::{AllocationSummary, AnalysisReport, CachelineAnalysis};
use crate::record::CACHELINE_SIZE;

/// Text report formatter
#[derive(Debug)]
pub struct TextOutput<'a> {
    report: &'a AnalysisReport,
    /// Mallocs listed in the allocation table, when one was loaded
    known_allocations: Option<usize>,
}

impl<'a> TextOutput<'a> {
    pub fn new(report: &'a AnalysisReport) -> Self {
        Self {
            report,
            known_allocations: None,
        }
    }

    /// Mention the allocation table size in the summary
    pub fn with_known_allocations(mut self, count: usize) -> Self {
        self.known_allocations = Some(count);
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        for line in &self.report.cachelines {
            write_cacheline(&mut out, line);
        }

        if !self.report.allocations.is_empty() {
            out.push_str("=== Allocations ===\n");
            for summary in &self.report.allocations {
                write_allocation(&mut out, summary);
            }
            out.push('\n');
        }

        self.write_summary(&mut out);
        out
    }

    fn write_summary(&self, out: &mut String) {
        let summary = &self.report.summary;
        let stats = &self.report.stats;

        out.push_str(&format!("{} cachelines in total.\n", summary.total));
        out.push_str(&format!(
            "{} cachelines are single threaded (removed).\n",
            summary.single_threaded
        ));
        out.push_str(&format!(
            "{} cachelines have a single equivalence group (removed).\n",
            summary.single_group
        ));
        out.push_str(&format!(
            "{} cachelines have estimated false sharing below threshold (removed).\n",
            summary.below_threshold
        ));
        out.push_str(&format!("Remain: {}.\n", summary.remaining));
        match stats.mean {
            Some(mean) => out.push_str(&format!(
                "Score: total {}, max {}, mean {:.2}.\n",
                stats.total, stats.max, mean
            )),
            None => out.push_str("Score: no data.\n"),
        }
        if let Some(known) = self.known_allocations {
            out.push_str(&format!(
                "{} mallocs occurred, {} implicated.\n",
                known,
                self.report.allocations.len()
            ));
        }
    }
}

fn write_cacheline(out: &mut String, line: &CachelineAnalysis) {
    let threads = line
        .threads
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&format!(
        "cacheline {:#x} (id {}): score {}, threads {{{}}}\n",
        line.cacheline_id * CACHELINE_SIZE,
        line.cacheline_id,
        line.score,
        threads
    ));
    for group in &line.groups {
        out.push_str(&format!(
            "  group {} [{} bytes, {}]\n",
            group.signature,
            group.byte_len(),
            group.total_rw()
        ));
        for member in &group.members {
            out.push_str(&format!("    {}\n", member));
        }
    }
    out.push('\n');
}

fn write_allocation(out: &mut String, summary: &AllocationSummary) {
    out.push_str(&format!(
        "malloc {}: score {}, {} cachelines, {} distinct offsets",
        summary.malloc_id,
        summary.total_score,
        summary.cachelines,
        summary.distinct_offsets()
    ));
    if let Some(size) = summary.size {
        out.push_str(&format!(", size {}", size));
    }
    if let Some(site) = summary.site {
        out.push_str(&format!(", site {}", site));
    }
    out.push('\n');
}
