// Breakpoint sweep over one cacheline's access records
//
// All ranges fall inside a single 64-byte line, so there are at most 65
// distinct breakpoints and the sweep is O(n * 64) for n records.

use super::addr_record::{AddrRecord, AllocationRef};
use crate::allocation::AllocationResolver;
use crate::attribution::AttributionPolicy;
use crate::cacheline::CachelineGroup;
use crate::error::{CacheshareError, Result};
use crate::record::{AccessRecord, ReadWrite, CACHELINE_SIZE};
use std::collections::BTreeMap;
use std::ops::Range;

/// Half-open interval overlap
pub fn overlaps(a: &Range<u64>, b: &Range<u64>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Sorted, de-duplicated start and end points of every record
pub fn breakpoints(records: &[AccessRecord]) -> Vec<u64> {
    let mut points: Vec<u64> = records
        .iter()
        .flat_map(|r| [r.address, r.end()])
        .collect();
    points.sort_unstable();
    points.dedup();
    points
}

fn violation(group: &CachelineGroup, reason: String) -> CacheshareError {
    CacheshareError::InvariantViolation {
        cacheline: group.id,
        reason,
    }
}

/// Decompose a cacheline into disjoint sub-ranges
///
/// Every adjacent pair of breakpoints `[l, r)` that at least one record
/// overlaps becomes an [`AddrRecord`] aggregating the counts of all
/// overlapping records, attributed according to `policy`. Unaccessed gaps
/// are skipped. The allocation of each sub-range is resolved once, at its
/// start address.
pub fn decompose<R>(
    group: &CachelineGroup,
    policy: AttributionPolicy,
    resolver: &R,
) -> Result<Vec<AddrRecord>>
where
    R: AllocationResolver + ?Sized,
{
    let line = group.base_address()..group.base_address().saturating_add(CACHELINE_SIZE);
    if let Some(outside) = group
        .records
        .iter()
        .find(|r| r.address < line.start || r.end() > line.end || r.size == 0)
    {
        return Err(violation(
            group,
            format!("record {:#x}+{} is not inside the line", outside.address, outside.size),
        ));
    }

    let points = breakpoints(&group.records);
    let segments: Vec<Range<u64>> = points.windows(2).map(|w| w[0]..w[1]).collect();

    // Each record covers a contiguous run of segments; precompute its share
    // of the counts for every segment in that run.
    let shares: Vec<(usize, Vec<ReadWrite>)> = group
        .records
        .iter()
        .map(|rec| {
            let first = points.partition_point(|&p| p < rec.address);
            let last = points.partition_point(|&p| p < rec.end());
            let lengths: Vec<u64> = segments[first..last]
                .iter()
                .map(|s| s.end - s.start)
                .collect();
            (first, policy.distribute(rec.rw(), &lengths))
        })
        .collect();

    let mut addr_records = Vec::with_capacity(segments.len());
    for (index, segment) in segments.iter().enumerate() {
        let mut thread_rw: BTreeMap<_, ReadWrite> = BTreeMap::new();
        let mut pc_rw: BTreeMap<_, ReadWrite> = BTreeMap::new();
        let mut touched = false;

        for (rec, (first, parts)) in group.records.iter().zip(&shares) {
            if !overlaps(segment, &rec.range()) {
                continue;
            }
            touched = true;
            let share = parts[index - first];
            *thread_rw.entry(rec.thread_id).or_default() += share;
            *pc_rw.entry(rec.location).or_default() += share;
        }

        if !touched {
            continue;
        }

        let allocation = resolver.resolve(segment.start).map(|hit| AllocationRef {
            malloc_id: hit.malloc_id,
            offset: hit.offset_of(segment.start),
        });
        addr_records.push(AddrRecord::from_parts(
            group.id,
            segment.clone(),
            thread_rw,
            pc_rw,
            allocation,
        ));
    }

    if addr_records.is_empty() {
        return Err(violation(group, "decomposition produced no sub-ranges".to_string()));
    }
    Ok(addr_records)
}

/// Merge ranges into their sorted union
fn union_of(mut ranges: Vec<Range<u64>>) -> Vec<Range<u64>> {
    ranges.sort_by_key(|r| (r.start, r.end));
    let mut merged: Vec<Range<u64>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

/// Check that sub-ranges are pairwise disjoint and cover exactly the union
/// of the input record ranges
pub fn verify_coverage(group: &CachelineGroup, addr_records: &[AddrRecord]) -> Result<()> {
    let mut ranges: Vec<Range<u64>> = addr_records.iter().map(AddrRecord::range).collect();
    ranges.sort_by_key(|r| r.start);
    if let Some(pair) = ranges.windows(2).find(|w| w[0].end > w[1].start) {
        return Err(violation(
            group,
            format!(
                "sub-ranges {:#x}..{:#x} and {:#x}..{:#x} overlap",
                pair[0].start, pair[0].end, pair[1].start, pair[1].end
            ),
        ));
    }

    let expected = union_of(group.records.iter().map(AccessRecord::range).collect());
    if union_of(ranges) != expected {
        return Err(violation(
            group,
            "sub-ranges do not cover the accessed bytes".to_string(),
        ));
    }
    Ok(())
}

/// Check that aggregated counts equal raw counts (exact-split only)
pub fn verify_conservation(group: &CachelineGroup, addr_records: &[AddrRecord]) -> Result<()> {
    let raw: ReadWrite = group.records.iter().map(AccessRecord::rw).sum();
    let aggregated: ReadWrite = addr_records.iter().map(AddrRecord::total_rw).sum();
    if raw != aggregated {
        return Err(violation(
            group,
            format!("aggregated {} but records carry {}", aggregated, raw),
        ));
    }
    Ok(())
}
