// End-to-end tests for the analysis pipeline

use super::*;
use crate::allocation::{Allocation, AllocationTable, NoAllocations};
use crate::attribution::AttributionPolicy;
use crate::equivalence::Signature;
use crate::estimator::GroupReduction;
use crate::record::{AccessRecord, CodeLocation, ReadWrite};

fn rec(thread: u32, address: u64, size: u32, reads: u32, writes: u32) -> AccessRecord {
    AccessRecord::new(thread, address, size, reads, writes, CodeLocation::new(thread, 1))
}

fn unfiltered() -> AnalysisConfig {
    AnalysisConfig {
        min_score: 0,
        ..AnalysisConfig::default()
    }
}

/// Two disjoint 8-byte accesses on cacheline 0
fn disjoint_pair() -> Vec<AccessRecord> {
    vec![rec(0, 0, 8, 0, 5), rec(1, 8, 8, 3, 2)]
}

#[test]
fn test_disjoint_pair_scores_ten() {
    let report = analyze(&disjoint_pair(), &NoAllocations, &unfiltered()).unwrap();

    assert_eq!(report.cachelines.len(), 1);
    let line = &report.cachelines[0];
    assert_eq!(line.cacheline_id, 0);
    assert_eq!(line.sub_range_count(), 2);
    assert_eq!(line.groups[0].signature, Signature::from_threads([0]));
    assert_eq!(line.groups[1].signature, Signature::from_threads([1]));
    assert_eq!(line.score, 10);
}

#[test]
fn test_disjoint_pair_sum_reduction() {
    let config = AnalysisConfig {
        reduction: GroupReduction::Sum,
        ..unfiltered()
    };
    let report = analyze(&disjoint_pair(), &NoAllocations, &config).unwrap();
    assert_eq!(report.cachelines[0].score, 5);
}

#[test]
fn test_disjoint_pair_below_default_threshold() {
    let report = analyze(&disjoint_pair(), &NoAllocations, &AnalysisConfig::default()).unwrap();

    assert!(report.cachelines.is_empty());
    assert_eq!(report.summary.total, 1);
    assert_eq!(report.summary.below_threshold, 1);
    assert_eq!(report.summary.remaining, 0);
    assert_eq!(report.stats.mean, None);
}

#[test]
fn test_overlapping_writes_three_groups() {
    let records = vec![rec(0, 0, 12, 0, 1), rec(1, 4, 12, 0, 1)];
    let report = analyze(&records, &NoAllocations, &unfiltered()).unwrap();

    let line = &report.cachelines[0];
    let signatures: Vec<String> = line.groups.iter().map(|g| g.signature.to_string()).collect();
    assert_eq!(signatures, vec!["{0}", "{0, 1}", "{1}"]);

    // Whole-record attribution counts each write in both sub-ranges it covers
    let writes: u64 = line.groups.iter().map(|g| g.total_writes()).sum();
    assert_eq!(writes, 4);
    assert_eq!(line.score, 3);
}

#[test]
fn test_overlapping_writes_exact_split_conserves() {
    let records = vec![rec(0, 0, 12, 0, 12), rec(1, 4, 12, 0, 12)];
    let config = AnalysisConfig {
        min_score: 0,
        ..AnalysisConfig::exact()
    };
    let report = analyze(&records, &NoAllocations, &config).unwrap();

    let total: ReadWrite = report.cachelines[0].groups.iter().map(|g| g.total_rw()).sum();
    assert_eq!(total, ReadWrite::new(0, 24));
}

#[test]
fn test_single_threaded_cacheline_filtered() {
    let records = vec![rec(3, 0, 8, 10, 10), rec(3, 32, 8, 10, 10)];
    let report = analyze(&records, &NoAllocations, &unfiltered()).unwrap();

    assert!(report.cachelines.is_empty());
    assert_eq!(report.summary.single_threaded, 1);
    assert!(report.summary.is_consistent());
}

#[test]
fn test_true_sharing_is_single_group() {
    // Both threads hammer the same bytes: one signature, nothing to report
    let records = vec![rec(0, 0, 8, 0, 100), rec(1, 0, 8, 0, 100)];
    let report = analyze(&records, &NoAllocations, &unfiltered()).unwrap();

    assert!(report.cachelines.is_empty());
    assert_eq!(report.summary.single_group, 1);
}

#[test]
fn test_filter_counts_add_up() {
    let mut records = Vec::new();
    // line 0: single threaded
    records.push(rec(0, 0, 8, 1, 1));
    // line 1: true sharing only
    records.push(rec(0, 64, 8, 0, 50));
    records.push(rec(1, 64, 8, 0, 50));
    // line 2: false sharing, score 10
    records.push(rec(0, 128, 8, 0, 5));
    records.push(rec(1, 136, 8, 3, 2));
    // line 3: false sharing, score 100
    records.push(rec(0, 192, 8, 0, 50));
    records.push(rec(1, 200, 8, 30, 20));

    let report = analyze(&records, &NoAllocations, &AnalysisConfig::default()).unwrap();
    let summary = report.summary;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.single_threaded, 1);
    assert_eq!(summary.single_group, 1);
    assert_eq!(summary.below_threshold, 1);
    assert_eq!(summary.remaining, 1);
    assert!(summary.is_consistent());
    assert_eq!(report.cachelines[0].cacheline_id, 3);
    assert_eq!(report.stats.total, 100);
    assert_eq!(report.stats.max, 100);
    assert_eq!(report.stats.mean, Some(100.0));
}

#[test]
fn test_permuted_input_is_deterministic() {
    let records = vec![
        rec(0, 0, 12, 2, 1),
        rec(1, 4, 12, 0, 7),
        rec(2, 32, 4, 9, 0),
        rec(0, 70, 8, 0, 30),
        rec(1, 80, 8, 4, 4),
        rec(2, 62, 4, 1, 1),
    ];
    let mut reversed = records.clone();
    reversed.reverse();
    let mut rotated = records.clone();
    rotated.rotate_left(2);

    let config = unfiltered();
    let base = analyze(&records, &NoAllocations, &config).unwrap();
    for permuted in [reversed, rotated] {
        let other = analyze(&permuted, &NoAllocations, &config).unwrap();
        assert_eq!(other.cachelines, base.cachelines);
        assert_eq!(other.summary, base.summary);
    }
}

#[test]
fn test_parallel_matches_sequential() {
    let records: Vec<AccessRecord> = (0..64u64)
        .flat_map(|line| {
            let base = line * 64;
            vec![
                rec(0, base, 8, 0, (line as u32 % 7) + 10),
                rec(1, base + 8, 8, 5, (line as u32 % 3) + 10),
                rec(2, base + 4, 8, 1, 0),
            ]
        })
        .collect();

    let sequential = analyze(&records, &NoAllocations, &unfiltered()).unwrap();
    let parallel = analyze(
        &records,
        &NoAllocations,
        &AnalysisConfig {
            parallel: true,
            threads: Some(4),
            ..unfiltered()
        },
    )
    .unwrap();

    assert_eq!(parallel.cachelines, sequential.cachelines);
    assert_eq!(parallel.summary, sequential.summary);
}

#[test]
fn test_invalid_config_rejected() {
    let config = AnalysisConfig {
        threads: Some(2),
        ..AnalysisConfig::default()
    };
    assert!(analyze(&disjoint_pair(), &NoAllocations, &config).is_err());
}

#[test]
fn test_empty_trace() {
    let report = analyze(&[], &NoAllocations, &AnalysisConfig::default()).unwrap();
    assert_eq!(report.summary, crate::filter::FilterSummary::default());
    assert!(report.allocations.is_empty());
    assert_eq!(report.stats.mean, None);
}

#[test]
fn test_allocation_aggregation() {
    let table = AllocationTable::new(vec![
        Allocation::new(7, 0x00, 0x08).with_site(CodeLocation::new(9, 9)),
        Allocation::new(8, 0x08, 0x38),
    ])
    .unwrap();

    let report = analyze(&disjoint_pair(), &table, &unfiltered()).unwrap();

    assert_eq!(report.allocations.len(), 2);
    for summary in &report.allocations {
        assert_eq!(summary.total_score, 10);
        assert_eq!(summary.cachelines, 1);
        assert_eq!(summary.distinct_offsets(), 1);
    }
    // Equal scores fall back to id order
    assert_eq!(report.allocations[0].malloc_id, 7);
    assert_eq!(report.allocations[0].site, Some(CodeLocation::new(9, 9)));
    assert_eq!(report.allocations[1].size, Some(0x38));
}

#[test]
fn test_allocation_score_added_once_per_cacheline() {
    // Three sub-ranges, all inside allocation 1
    let table = AllocationTable::new(vec![Allocation::new(1, 0, 0x100)]).unwrap();
    let records = vec![rec(0, 0, 12, 0, 20), rec(1, 4, 12, 0, 20)];

    let report = analyze(&records, &table, &unfiltered()).unwrap();
    let line_score = report.cachelines[0].score;

    assert_eq!(report.allocations.len(), 1);
    assert_eq!(report.allocations[0].total_score, line_score);
    assert_eq!(report.allocations[0].distinct_offsets(), 3);
}

#[test]
fn test_allocations_sorted_by_score() {
    let table = AllocationTable::new(vec![
        Allocation::new(1, 0, 64),
        Allocation::new(2, 64, 64),
    ])
    .unwrap();
    let records = vec![
        rec(0, 0, 8, 0, 5),
        rec(1, 8, 8, 3, 2),
        rec(0, 64, 8, 0, 50),
        rec(1, 72, 8, 30, 20),
    ];

    let report = analyze(&records, &table, &unfiltered()).unwrap();
    let ids: Vec<_> = report.allocations.iter().map(|a| a.malloc_id).collect();
    assert_eq!(ids, vec![2, 1]);
}

#[test]
fn test_straddling_record_reaches_both_lines() {
    let records = vec![
        rec(0, 60, 8, 0, 40),
        rec(1, 56, 4, 0, 40),
        rec(1, 68, 4, 0, 40),
    ];
    let config = AnalysisConfig {
        attribution: AttributionPolicy::WholeRecord,
        ..unfiltered()
    };
    let report = analyze(&records, &NoAllocations, &config).unwrap();
    let ids: Vec<_> = report.cachelines.iter().map(|c| c.cacheline_id).collect();
    assert_eq!(ids, vec![0, 1]);
}
