//! JSON output format for false-sharing reports
//!
//! `--format json`: one document holding the filter summary, score statistics,
//! every retained cacheline and the per-allocation totals.

use crate::decompose::AddrRecord;
use crate::equivalence::EquivalenceGroup;
use crate::pipeline::{AllocationSummary, AnalysisReport, CachelineAnalysis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Read/write counts attributed to one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonCounts {
    pub reads: u64,
    pub writes: u64,
}

/// One disjoint sub-range of a cacheline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSubRange {
    /// Start address (hex)
    pub start: String,
    pub size: u64,
    /// Counts per thread id
    pub threads: BTreeMap<u32, JsonCounts>,
    /// Counts per code location ("f<function>:i<instruction>")
    pub locations: BTreeMap<String, JsonCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub malloc_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// Sub-ranges sharing one thread signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonGroup {
    /// Every thread touching a written range, empty for read-only ranges
    pub signature: Vec<u32>,
    pub reads: u64,
    pub writes: u64,
    pub members: Vec<JsonSubRange>,
}

/// A retained cacheline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonCacheline {
    pub cacheline_id: u64,
    /// Base address (hex)
    pub address: String,
    pub threads: Vec<u32>,
    pub score: u64,
    pub groups: Vec<JsonGroup>,
}

/// Per-allocation totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonAllocation {
    pub malloc_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub distinct_offsets: usize,
    /// Offset -> number of sub-ranges starting there
    pub offsets: BTreeMap<u64, usize>,
    pub cachelines: usize,
    pub total_score: u64,
}

/// Filter stage counts and score statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSummary {
    pub total_cachelines: usize,
    pub single_threaded: usize,
    pub single_group: usize,
    pub below_threshold: usize,
    pub remaining: usize,
    pub total_score: u64,
    pub max_score: u64,
    /// Absent when no cacheline remains
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_score: Option<f64>,
}

/// Root JSON output structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonOutput {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    pub summary: JsonSummary,
    pub cachelines: Vec<JsonCacheline>,
    pub allocations: Vec<JsonAllocation>,
}

impl JsonOutput {
    /// Build the JSON document for a report
    pub fn from_report(report: &AnalysisReport) -> Self {
        let summary = &report.summary;
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "cacheshare-json-v1".to_string(),
            summary: JsonSummary {
                total_cachelines: summary.total,
                single_threaded: summary.single_threaded,
                single_group: summary.single_group,
                below_threshold: summary.below_threshold,
                remaining: summary.remaining,
                total_score: report.stats.total,
                max_score: report.stats.max,
                mean_score: report.stats.mean,
            },
            cachelines: report.cachelines.iter().map(json_cacheline).collect(),
            allocations: report.allocations.iter().map(json_allocation).collect(),
        }
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn json_cacheline(analysis: &CachelineAnalysis) -> JsonCacheline {
    JsonCacheline {
        cacheline_id: analysis.cacheline_id,
        address: format!("{:#x}", analysis.cacheline_id * crate::record::CACHELINE_SIZE),
        threads: analysis.threads.iter().copied().collect(),
        score: analysis.score,
        groups: analysis.groups.iter().map(json_group).collect(),
    }
}

fn json_group(group: &EquivalenceGroup) -> JsonGroup {
    let rw = group.total_rw();
    JsonGroup {
        signature: group.signature.threads().iter().copied().collect(),
        reads: rw.reads,
        writes: rw.writes,
        members: group.members.iter().map(json_sub_range).collect(),
    }
}

fn json_sub_range(ar: &AddrRecord) -> JsonSubRange {
    let counts = |rw: &crate::record::ReadWrite| JsonCounts {
        reads: rw.reads,
        writes: rw.writes,
    };
    JsonSubRange {
        start: format!("{:#x}", ar.start()),
        size: ar.len(),
        threads: ar.thread_rw().iter().map(|(t, rw)| (*t, counts(rw))).collect(),
        locations: ar
            .pc_rw()
            .iter()
            .map(|(loc, rw)| (loc.to_string(), counts(rw)))
            .collect(),
        malloc_id: ar.allocation().map(|a| a.malloc_id),
        offset: ar.allocation().map(|a| a.offset),
    }
}

fn json_allocation(summary: &AllocationSummary) -> JsonAllocation {
    JsonAllocation {
        malloc_id: summary.malloc_id,
        size: summary.size,
        site: summary.site.map(|s| s.to_string()),
        distinct_offsets: summary.distinct_offsets(),
        offsets: summary.offsets.clone(),
        cachelines: summary.cachelines,
        total_score: summary.total_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{Allocation, AllocationTable};
    use crate::pipeline::{analyze, AnalysisConfig};
    use crate::record::{AccessRecord, CodeLocation};

    fn report() -> AnalysisReport {
        let table = AllocationTable::new(vec![Allocation::new(4, 0x1000, 0x40)]).unwrap();
        let records = vec![
            AccessRecord::new(0, 0x1000, 8, 0, 50, CodeLocation::new(1, 2)),
            AccessRecord::new(1, 0x1008, 8, 30, 20, CodeLocation::new(1, 3)),
        ];
        analyze(&records, &table, &AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn test_json_document_shape() {
        let output = JsonOutput::from_report(&report());
        let json = output.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["format"], "cacheshare-json-v1");
        assert_eq!(value["summary"]["remaining"], 1);
        assert_eq!(value["cachelines"][0]["address"], "0x1000");
        assert_eq!(value["cachelines"][0]["score"], 100);
        assert_eq!(value["cachelines"][0]["groups"][0]["signature"][0], 0);
        assert_eq!(
            value["cachelines"][0]["groups"][1]["members"][0]["locations"]["f1:i3"]["reads"],
            30
        );
        assert_eq!(value["allocations"][0]["malloc_id"], 4);
        assert_eq!(value["allocations"][0]["distinct_offsets"], 2);
    }

    #[test]
    fn test_signature_includes_readers_of_written_range() {
        let records = vec![
            AccessRecord::new(0, 0, 8, 0, 40, CodeLocation::new(1, 1)),
            AccessRecord::new(1, 0, 8, 40, 0, CodeLocation::new(1, 2)),
            AccessRecord::new(2, 8, 8, 0, 40, CodeLocation::new(1, 3)),
        ];
        let report = analyze(
            &records,
            &crate::allocation::NoAllocations,
            &AnalysisConfig::default(),
        )
        .unwrap();
        let value = serde_json::to_value(JsonOutput::from_report(&report)).unwrap();
        let groups = &value["cachelines"][0]["groups"];

        assert_eq!(groups[0]["signature"], serde_json::json!([0, 1]));
        assert_eq!(groups[1]["signature"], serde_json::json!([2]));
    }

    #[test]
    fn test_mean_omitted_without_data() {
        let empty = analyze(&[], &crate::allocation::NoAllocations, &AnalysisConfig::default())
            .unwrap();
        let json = JsonOutput::from_report(&empty).to_json().unwrap();
        assert!(!json.contains("mean_score"));
        assert!(json.contains("\"total_cachelines\": 0"));
    }
}
