// Disjoint sub-range of a cacheline with aggregated access counts

use crate::allocation::MallocId;
use crate::record::{CachelineId, CodeLocation, ReadWrite, ThreadId, CACHELINE_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Range;

/// Allocation enclosing the start of a sub-range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AllocationRef {
    pub malloc_id: MallocId,
    pub offset: u64,
}

/// One disjoint byte range `[start, end)` inside a cacheline
///
/// Holds read/write counts per thread and per code location for every access
/// record overlapping the range. Built once by the decomposer and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrRecord {
    cacheline_id: CachelineId,
    start: u64,
    end: u64,
    thread_rw: BTreeMap<ThreadId, ReadWrite>,
    pc_rw: BTreeMap<CodeLocation, ReadWrite>,
    allocation: Option<AllocationRef>,
}

impl AddrRecord {
    /// Assemble a sub-range from already aggregated counts
    pub fn from_parts(
        cacheline_id: CachelineId,
        range: Range<u64>,
        thread_rw: BTreeMap<ThreadId, ReadWrite>,
        pc_rw: BTreeMap<CodeLocation, ReadWrite>,
        allocation: Option<AllocationRef>,
    ) -> Self {
        debug_assert!(range.start < range.end);
        Self {
            cacheline_id,
            start: range.start,
            end: range.end,
            thread_rw,
            pc_rw,
            allocation,
        }
    }

    pub fn cacheline_id(&self) -> CachelineId {
        self.cacheline_id
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }

    /// Length in bytes
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Offset of the first byte from the cacheline base
    pub fn line_offset(&self) -> u64 {
        self.start - self.cacheline_id * CACHELINE_SIZE
    }

    pub fn thread_rw(&self) -> &BTreeMap<ThreadId, ReadWrite> {
        &self.thread_rw
    }

    pub fn pc_rw(&self) -> &BTreeMap<CodeLocation, ReadWrite> {
        &self.pc_rw
    }

    pub fn allocation(&self) -> Option<AllocationRef> {
        self.allocation
    }

    /// Threads that touched this range
    pub fn threads(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.thread_rw.keys().copied()
    }

    pub fn total_rw(&self) -> ReadWrite {
        self.thread_rw.values().copied().sum()
    }

    pub fn total_writes(&self) -> u64 {
        self.total_rw().writes
    }

    pub fn is_read_only(&self) -> bool {
        self.thread_rw.values().all(|rw| rw.writes == 0)
    }

    /// More than one thread touched the same bytes
    pub fn is_true_shared(&self) -> bool {
        self.thread_rw.len() > 1
    }

    /// Counts of threads not in `excluded`
    pub fn rw_excluding(&self, excluded: &BTreeSet<ThreadId>) -> ReadWrite {
        self.thread_rw
            .iter()
            .filter(|(thread, _)| !excluded.contains(thread))
            .map(|(_, rw)| *rw)
            .sum()
    }
}

impl fmt::Display for AddrRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:#04x}, {:#04x})({})@{}: {{",
            self.line_offset(),
            self.line_offset() + self.len(),
            self.len(),
            self.cacheline_id
        )?;
        for (i, (thread, rw)) in self.thread_rw.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", thread, rw)?;
        }
        f.write_str("} {")?;
        for (i, (pc, rw)) in self.pc_rw.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", pc, rw)?;
        }
        f.write_str("}")?;
        if let Some(alloc) = self.allocation {
            write!(f, " m{}+{:#x}", alloc.malloc_id, alloc.offset)?;
        }
        Ok(())
    }
}
