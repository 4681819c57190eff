//! Memory access records
//!
//! An [`AccessRecord`] is one row of the access trace: a thread touched
//! `size` bytes at `address`, some number of times for reading and writing,
//! from a given code location. Records are immutable once ingested.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Range};

/// Size of a cacheline in bytes
pub const CACHELINE_SIZE: u64 = 64;

/// Identifier of a traced thread
pub type ThreadId = u32;

/// Identifier of a cacheline (`address / CACHELINE_SIZE`)
pub type CachelineId = u64;

/// Cacheline containing `address`
pub fn cacheline_of(address: u64) -> CachelineId {
    address / CACHELINE_SIZE
}

/// Code location that issued an access: (function id, instruction id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CodeLocation {
    pub function_id: u32,
    pub instruction_id: u32,
}

impl CodeLocation {
    pub fn new(function_id: u32, instruction_id: u32) -> Self {
        Self {
            function_id,
            instruction_id,
        }
    }
}

impl fmt::Display for CodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}:i{}", self.function_id, self.instruction_id)
    }
}

/// Aggregated read and write counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadWrite {
    pub reads: u64,
    pub writes: u64,
}

impl ReadWrite {
    pub fn new(reads: u64, writes: u64) -> Self {
        Self { reads, writes }
    }

    /// Normalise a legacy write flag to `(0, 1)` or `(1, 0)`
    pub fn from_write_flag(is_write: bool) -> Self {
        if is_write {
            Self::new(0, 1)
        } else {
            Self::new(1, 0)
        }
    }

    /// Total access volume (reads + writes)
    pub fn total(&self) -> u64 {
        self.reads + self.writes
    }

    pub fn is_zero(&self) -> bool {
        self.reads == 0 && self.writes == 0
    }
}

impl Add for ReadWrite {
    type Output = ReadWrite;

    fn add(self, rhs: ReadWrite) -> ReadWrite {
        ReadWrite::new(self.reads + rhs.reads, self.writes + rhs.writes)
    }
}

impl AddAssign for ReadWrite {
    fn add_assign(&mut self, rhs: ReadWrite) {
        self.reads += rhs.reads;
        self.writes += rhs.writes;
    }
}

impl std::iter::Sum for ReadWrite {
    fn sum<I: Iterator<Item = ReadWrite>>(iter: I) -> Self {
        iter.fold(ReadWrite::default(), Add::add)
    }
}

impl fmt::Display for ReadWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}r/{}w", self.reads, self.writes)
    }
}

/// A single memory access event from the trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRecord {
    pub thread_id: ThreadId,
    pub address: u64,
    pub size: u32,
    pub reads: u32,
    pub writes: u32,
    pub location: CodeLocation,
}

impl AccessRecord {
    pub fn new(
        thread_id: ThreadId,
        address: u64,
        size: u32,
        reads: u32,
        writes: u32,
        location: CodeLocation,
    ) -> Self {
        Self {
            thread_id,
            address,
            size,
            reads,
            writes,
            location,
        }
    }

    /// Build a record from the legacy trace shape that only carries a write flag
    pub fn from_write_flag(
        thread_id: ThreadId,
        address: u64,
        size: u32,
        is_write: bool,
        location: CodeLocation,
    ) -> Self {
        let (reads, writes) = if is_write { (0, 1) } else { (1, 0) };
        Self::new(thread_id, address, size, reads, writes, location)
    }

    /// Cacheline holding the first byte of this access
    pub fn cacheline_id(&self) -> CachelineId {
        cacheline_of(self.address)
    }

    /// One past the last byte touched
    pub fn end(&self) -> u64 {
        self.address + u64::from(self.size)
    }

    /// Half-open byte range `[address, address + size)`
    pub fn range(&self) -> Range<u64> {
        self.address..self.end()
    }

    pub fn rw(&self) -> ReadWrite {
        ReadWrite::new(u64::from(self.reads), u64::from(self.writes))
    }

    /// Cachelines touched by this access, first to last inclusive
    pub fn cachelines(&self) -> Range<CachelineId> {
        let first = cacheline_of(self.address);
        let last = cacheline_of(self.end().saturating_sub(1).max(self.address));
        first..last + 1
    }
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{:#x},{},{},{},{}",
            self.cacheline_id(),
            self.thread_id,
            self.address,
            self.location,
            self.size,
            self.reads,
            self.writes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> CodeLocation {
        CodeLocation::new(1, 2)
    }

    #[test]
    fn test_cacheline_id() {
        let rec = AccessRecord::new(0, 0x1000 + 70, 4, 1, 0, loc());
        assert_eq!(rec.cacheline_id(), (0x1000 / 64) + 1);
    }

    #[test]
    fn test_range_is_half_open() {
        let rec = AccessRecord::new(0, 16, 8, 1, 0, loc());
        assert_eq!(rec.range(), 16..24);
        assert_eq!(rec.end(), 24);
    }

    #[test]
    fn test_write_flag_normalisation() {
        let w = AccessRecord::from_write_flag(1, 0, 4, true, loc());
        assert_eq!((w.reads, w.writes), (0, 1));
        let r = AccessRecord::from_write_flag(1, 0, 4, false, loc());
        assert_eq!((r.reads, r.writes), (1, 0));
        assert_eq!(ReadWrite::from_write_flag(true), ReadWrite::new(0, 1));
    }

    #[test]
    fn test_cachelines_single_line() {
        let rec = AccessRecord::new(0, 64, 64, 1, 0, loc());
        assert_eq!(rec.cachelines(), 1..2);
    }

    #[test]
    fn test_cachelines_straddling() {
        let rec = AccessRecord::new(0, 60, 8, 1, 0, loc());
        assert_eq!(rec.cachelines(), 0..2);
    }

    #[test]
    fn test_read_write_sum() {
        let total: ReadWrite = vec![ReadWrite::new(1, 2), ReadWrite::new(3, 4)]
            .into_iter()
            .sum();
        assert_eq!(total, ReadWrite::new(4, 6));
        assert_eq!(total.total(), 10);
    }
}
