//! Cacheline grouping
//!
//! Partitions access records by the cacheline they touch. Groups come out
//! ordered by cacheline id; inside a group records keep their ingestion order.

use crate::attribution::AttributionPolicy;
use crate::filter::{retain_counted, FilterOutcome};
use crate::record::{AccessRecord, CachelineId, ThreadId, CACHELINE_SIZE};
use std::collections::{BTreeMap, BTreeSet};

/// All access records that fall inside one cacheline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachelineGroup {
    pub id: CachelineId,
    pub records: Vec<AccessRecord>,
}

impl CachelineGroup {
    /// First byte address of the cacheline
    pub fn base_address(&self) -> u64 {
        self.id * CACHELINE_SIZE
    }

    /// Distinct threads touching this cacheline
    pub fn threads(&self) -> BTreeSet<ThreadId> {
        self.records.iter().map(|r| r.thread_id).collect()
    }

    /// A single thread cannot falsely share with itself
    pub fn is_single_threaded(&self) -> bool {
        let mut threads = self.records.iter().map(|r| r.thread_id);
        match threads.next() {
            Some(first) => threads.all(|t| t == first),
            None => true,
        }
    }
}

/// Cut a record at cacheline boundaries
///
/// Records already inside one cacheline come back unchanged. Counts of a
/// straddling record are attributed to its pieces according to `policy`.
pub fn split_at_cachelines(record: &AccessRecord, policy: AttributionPolicy) -> Vec<AccessRecord> {
    let lines = record.cachelines();
    if lines.end - lines.start <= 1 {
        return vec![record.clone()];
    }

    let pieces: Vec<(u64, u64)> = lines
        .map(|line| {
            let start = record.address.max(line * CACHELINE_SIZE);
            let end = record.end().min((line * CACHELINE_SIZE).saturating_add(CACHELINE_SIZE));
            (start, end)
        })
        .collect();
    let lengths: Vec<u64> = pieces.iter().map(|(s, e)| e - s).collect();
    let shares = policy.distribute(record.rw(), &lengths);

    pieces
        .into_iter()
        .zip(shares)
        .map(|((start, end), share)| {
            AccessRecord::new(
                record.thread_id,
                start,
                (end - start) as u32,
                u32::try_from(share.reads).unwrap_or(u32::MAX),
                u32::try_from(share.writes).unwrap_or(u32::MAX),
                record.location,
            )
        })
        .collect()
}

/// Group records by cacheline id
///
/// Deterministic for a given input multiset: groups are sorted by id and each
/// group preserves the relative order of its records.
pub fn group_by_cacheline(records: &[AccessRecord], policy: AttributionPolicy) -> Vec<CachelineGroup> {
    let mut lines: BTreeMap<CachelineId, Vec<AccessRecord>> = BTreeMap::new();
    let mut straddling = 0usize;

    for record in records {
        let pieces = split_at_cachelines(record, policy);
        if pieces.len() > 1 {
            straddling += 1;
        }
        for piece in pieces {
            lines.entry(piece.cacheline_id()).or_default().push(piece);
        }
    }

    if straddling > 0 {
        tracing::debug!("{} records straddle a cacheline boundary", straddling);
    }

    lines
        .into_iter()
        .map(|(id, records)| CachelineGroup { id, records })
        .collect()
}

/// Drop cachelines touched by only one thread, counting them
pub fn filter_single_threaded(groups: Vec<CachelineGroup>) -> FilterOutcome<CachelineGroup> {
    retain_counted(groups, |g| !g.is_single_threaded())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CodeLocation;

    fn rec(thread: u32, address: u64, size: u32, reads: u32, writes: u32) -> AccessRecord {
        AccessRecord::new(thread, address, size, reads, writes, CodeLocation::new(0, 0))
    }

    #[test]
    fn test_groups_sorted_by_cacheline() {
        let records = vec![rec(0, 200, 4, 1, 0), rec(1, 10, 4, 1, 0), rec(0, 70, 4, 0, 1)];
        let groups = group_by_cacheline(&records, AttributionPolicy::WholeRecord);
        let ids: Vec<u64> = groups.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![0, 1, 3]);
    }

    #[test]
    fn test_group_preserves_ingestion_order() {
        let records = vec![rec(2, 8, 4, 1, 0), rec(1, 0, 4, 1, 0), rec(3, 16, 4, 1, 0)];
        let groups = group_by_cacheline(&records, AttributionPolicy::WholeRecord);
        assert_eq!(groups.len(), 1);
        let threads: Vec<u32> = groups[0].records.iter().map(|r| r.thread_id).collect();
        assert_eq!(threads, vec![2, 1, 3]);
    }

    #[test]
    fn test_straddling_record_whole_record() {
        let pieces = split_at_cachelines(&rec(0, 60, 8, 2, 3), AttributionPolicy::WholeRecord);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].range(), 60..64);
        assert_eq!(pieces[1].range(), 64..68);
        assert!(pieces.iter().all(|p| p.reads == 2 && p.writes == 3));
    }

    #[test]
    fn test_straddling_record_exact_split() {
        let pieces = split_at_cachelines(&rec(0, 56, 16, 4, 8), AttributionPolicy::ExactSplit);
        assert_eq!(pieces[0].range(), 56..64);
        assert_eq!((pieces[0].reads, pieces[0].writes), (2, 4));
        assert_eq!((pieces[1].reads, pieces[1].writes), (2, 4));
    }

    #[test]
    fn test_single_threaded_filter_counts_removed() {
        let records = vec![
            rec(0, 0, 4, 1, 0),
            rec(0, 8, 4, 0, 1),
            rec(0, 64, 4, 1, 0),
            rec(1, 72, 4, 0, 1),
        ];
        let groups = group_by_cacheline(&records, AttributionPolicy::WholeRecord);
        let outcome = filter_single_threaded(groups);
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.retained.len(), 1);
        assert_eq!(outcome.retained[0].id, 1);
    }

    #[test]
    fn test_threads() {
        let group = CachelineGroup {
            id: 0,
            records: vec![rec(3, 0, 4, 1, 0), rec(1, 4, 4, 1, 0), rec(3, 8, 4, 1, 0)],
        };
        assert_eq!(group.threads().into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert!(!group.is_single_threaded());
        assert_eq!(group.base_address(), 0);
    }
}
