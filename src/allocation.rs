//! Heap allocation lookup
//!
//! The allocation table is loaded once before analysis and never changes
//! afterwards. Analysis code only sees it through [`AllocationResolver`], so
//! it can be shared read-only across worker threads.
//!
//! Table rows:
//!
//! ```text
//! malloc_id, start_address(hex), size[, function_id, instruction_id]
//! ```
//!
//! The optional trailing pair names the allocation call site; a function id
//! of `-1` means the site is unknown.

use crate::error::{CacheshareError, Result};
use crate::ingest::{csv_reader, is_blank, parse_address, parse_number};
use crate::record::CodeLocation;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Identifier of a heap allocation
pub type MallocId = u32;

/// One heap allocation `[start, start + size)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: MallocId,
    pub start: u64,
    pub size: u64,
    pub site: Option<CodeLocation>,
}

impl Allocation {
    pub fn new(id: MallocId, start: u64, size: u64) -> Self {
        Self {
            id,
            start,
            size,
            site: None,
        }
    }

    pub fn with_site(mut self, site: CodeLocation) -> Self {
        self.site = Some(site);
        self
    }

    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        self.start <= address && address < self.end()
    }
}

/// Result of resolving an address against the allocation table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationHit {
    pub malloc_id: MallocId,
    pub range_start: u64,
    pub range_end: u64,
}

impl AllocationHit {
    /// Offset of `address` from the start of the allocation
    pub fn offset_of(&self, address: u64) -> u64 {
        address - self.range_start
    }
}

/// Read-only address to allocation lookup
pub trait AllocationResolver: Sync {
    /// Find the allocation enclosing `address`, if any
    fn resolve(&self, address: u64) -> Option<AllocationHit>;

    /// Full description of an allocation, when the resolver keeps one
    fn describe(&self, _id: MallocId) -> Option<&Allocation> {
        None
    }
}

/// Resolver used when no allocation table is available
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAllocations;

impl AllocationResolver for NoAllocations {
    fn resolve(&self, _address: u64) -> Option<AllocationHit> {
        None
    }
}

/// Static table of non-overlapping allocations, sorted by start address
#[derive(Debug, Clone, Default)]
pub struct AllocationTable {
    allocations: Vec<Allocation>,
    /// Position of each id in `allocations`
    by_id: HashMap<MallocId, usize>,
}

impl AllocationTable {
    /// Build a table, rejecting duplicate ids and overlapping ranges
    pub fn new(mut allocations: Vec<Allocation>) -> Result<Self> {
        allocations.sort_by_key(|a| (a.start, a.size));

        let mut by_id = HashMap::with_capacity(allocations.len());
        for (index, alloc) in allocations.iter().enumerate() {
            if by_id.insert(alloc.id, index).is_some() {
                return Err(CacheshareError::DuplicateAllocation(alloc.id));
            }
        }

        let mut prev: Option<&Allocation> = None;
        for alloc in allocations.iter().filter(|a| a.size > 0) {
            if let Some(p) = prev {
                if alloc.start < p.end() {
                    return Err(CacheshareError::AllocationOverlap {
                        first: p.id,
                        second: alloc.id,
                    });
                }
            }
            prev = Some(alloc);
        }

        let empty = allocations.iter().filter(|a| a.size == 0).count();
        if empty > 0 {
            tracing::warn!("{} zero-sized allocations can never be resolved", empty);
        }

        Ok(Self { allocations, by_id })
    }

    /// Parse a table from CSV rows
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv_reader(reader);
        let mut allocations = Vec::new();

        for row in csv.records() {
            let row = row?;
            if is_blank(&row) {
                continue;
            }
            let line = row.position().map_or(0, |p| p.line());
            let fields: Vec<&str> = row.iter().collect();
            allocations.push(parse_allocation_row(&fields, line)?);
        }

        tracing::info!("loaded {} allocations", allocations.len());
        Self::new(allocations)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    pub fn get(&self, id: MallocId) -> Option<&Allocation> {
        self.by_id.get(&id).map(|&index| &self.allocations[index])
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Allocation> {
        self.allocations.iter()
    }
}

impl AllocationResolver for AllocationTable {
    fn resolve(&self, address: u64) -> Option<AllocationHit> {
        // Non-empty ranges never overlap, so only the last non-empty
        // allocation starting at or before the address can contain it
        let idx = self.allocations.partition_point(|a| a.start <= address);
        self.allocations[..idx]
            .iter()
            .rev()
            .find(|a| a.size > 0)
            .filter(|a| a.contains(address))
            .map(|a| AllocationHit {
                malloc_id: a.id,
                range_start: a.start,
                range_end: a.end(),
            })
    }

    fn describe(&self, id: MallocId) -> Option<&Allocation> {
        self.get(id)
    }
}

fn parse_allocation_row(fields: &[&str], line: u64) -> Result<Allocation> {
    if fields.len() != 3 && fields.len() != 5 {
        return Err(CacheshareError::FieldCount {
            line,
            expected: "3 or 5".to_string(),
            found: fields.len(),
        });
    }

    let id = parse_number(fields[0], "malloc_id", line)?;
    let start = parse_address(fields[1], "start_address", line)?;
    let size = parse_number(fields[2], "allocation size", line)?;
    let mut allocation = Allocation::new(id, start, size);

    if fields.len() == 5 {
        let function_id: i64 = parse_number(fields[3], "site function_id", line)?;
        if function_id >= 0 {
            let function_id =
                u32::try_from(function_id).map_err(|_| CacheshareError::InvalidField {
                    line,
                    field: "site function_id",
                    value: fields[3].to_string(),
                })?;
            let instruction_id = parse_number(fields[4], "site instruction_id", line)?;
            allocation = allocation.with_site(CodeLocation::new(function_id, instruction_id));
        }
    }
    Ok(allocation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AllocationTable {
        AllocationTable::new(vec![
            Allocation::new(2, 0x2000, 0x40),
            Allocation::new(1, 0x1000, 0x100),
            Allocation::new(3, 0x2040, 0x10),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_inside() {
        let hit = table().resolve(0x1010).unwrap();
        assert_eq!(hit.malloc_id, 1);
        assert_eq!(hit.offset_of(0x1010), 0x10);
        assert_eq!(hit.range_end, 0x1100);
    }

    #[test]
    fn test_resolve_adjacent_allocations() {
        let t = table();
        assert_eq!(t.resolve(0x203f).unwrap().malloc_id, 2);
        assert_eq!(t.resolve(0x2040).unwrap().malloc_id, 3);
    }

    #[test]
    fn test_resolve_not_found() {
        let t = table();
        assert!(t.resolve(0x0).is_none());
        assert!(t.resolve(0x1100).is_none());
        assert!(t.resolve(0x2050).is_none());
        assert!(NoAllocations.resolve(0x1010).is_none());
    }

    #[test]
    fn test_overlap_rejected() {
        let err = AllocationTable::new(vec![
            Allocation::new(1, 0x1000, 0x100),
            Allocation::new(2, 0x10f0, 0x20),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            CacheshareError::AllocationOverlap {
                first: 1,
                second: 2
            }
        ));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = AllocationTable::new(vec![
            Allocation::new(1, 0x1000, 0x10),
            Allocation::new(1, 0x2000, 0x10),
        ])
        .unwrap_err();
        assert!(matches!(err, CacheshareError::DuplicateAllocation(1)));
    }

    #[test]
    fn test_get_by_id_after_sorting() {
        let allocations: Vec<Allocation> = (0..1000u32)
            .rev()
            .map(|i| Allocation::new(i * 7 % 1000, u64::from(i) * 0x100, 0x80))
            .collect();
        let t = AllocationTable::new(allocations).unwrap();

        for id in [0, 7, 500, 999] {
            let alloc = t.get(id).unwrap();
            assert_eq!(alloc.id, id);
            assert_eq!(t.describe(id), Some(alloc));
            assert_eq!(t.resolve(alloc.start).unwrap().malloc_id, id);
        }
        assert!(t.get(1000).is_none());
    }

    #[test]
    fn test_whitespace_only_rows_skipped() {
        let t = AllocationTable::from_reader("1,0x1000,16\n  \n2,0x2000,16\n".as_bytes()).unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_zero_sized_allocation_never_resolves() {
        let t = AllocationTable::new(vec![
            Allocation::new(1, 0x1000, 0x100),
            Allocation::new(2, 0x1100, 0),
        ])
        .unwrap();
        assert!(t.resolve(0x1100).is_none());
        assert_eq!(t.resolve(0x10ff).unwrap().malloc_id, 1);
    }

    #[test]
    fn test_from_reader_with_sites() {
        let input = "1,0x1000,256,4,7\n2,0x2000,64,-1,0\n3,3000,16\n";
        let t = AllocationTable::from_reader(input.as_bytes()).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(1).unwrap().site, Some(CodeLocation::new(4, 7)));
        assert_eq!(t.get(2).unwrap().site, None);
        assert_eq!(t.get(3).unwrap().start, 0x3000);
    }

    #[test]
    fn test_from_reader_bad_row() {
        let err = AllocationTable::from_reader("1,0x1000\n".as_bytes()).unwrap_err();
        assert!(matches!(err, CacheshareError::FieldCount { found: 2, .. }));
    }
}
