//! Thread-equivalence grouping of sub-ranges
//!
//! Sub-ranges of a cacheline are classified by their thread signature: the
//! set of threads touching a range that is written, or the empty set for a
//! read-only range. Read-only ranges cannot cause false sharing by themselves,
//! so they all collapse into the empty signature regardless of their readers.
//!
//! Two sub-ranges are thread-equivalent iff their signatures are equal. The
//! relation is the basis both for [`group_by_signature`] and for the edge set
//! of the [`EquivalenceGraph`]; both yield the same partition.

mod graph;

pub use graph::EquivalenceGraph;

use crate::decompose::AddrRecord;
use crate::record::{ReadWrite, ThreadId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Thread signature of a sub-range
///
/// Ordered lexicographically over the sorted thread ids, empty set first.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Signature(BTreeSet<ThreadId>);

impl Signature {
    /// Canonical signature of every read-only sub-range
    pub fn read_only() -> Self {
        Self(BTreeSet::new())
    }

    pub fn from_threads<I: IntoIterator<Item = ThreadId>>(threads: I) -> Self {
        Self(threads.into_iter().collect())
    }

    /// Signature of a sub-range
    pub fn of(record: &AddrRecord) -> Self {
        if record.total_writes() == 0 {
            Self::read_only()
        } else {
            Self::from_threads(record.threads())
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.0.is_empty()
    }

    pub fn threads(&self) -> &BTreeSet<ThreadId> {
        &self.0
    }

    pub fn contains(&self, thread: ThreadId) -> bool {
        self.0.contains(&thread)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, thread) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", thread)?;
        }
        f.write_str("}")
    }
}

/// Both read-only, or identical non-empty signatures
pub fn thread_equivalent(a: &AddrRecord, b: &AddrRecord) -> bool {
    Signature::of(a) == Signature::of(b)
}

/// Sub-ranges of one cacheline sharing a thread signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquivalenceGroup {
    pub signature: Signature,
    pub members: Vec<AddrRecord>,
}

impl EquivalenceGroup {
    /// Counts over all members and threads
    pub fn total_rw(&self) -> ReadWrite {
        self.members.iter().map(AddrRecord::total_rw).sum()
    }

    pub fn total_writes(&self) -> u64 {
        self.total_rw().writes
    }

    /// Counts over all members, ignoring the given threads
    pub fn rw_excluding(&self, excluded: &Signature) -> ReadWrite {
        self.members
            .iter()
            .map(|m| m.rw_excluding(excluded.threads()))
            .sum()
    }

    /// Bytes covered by the members
    pub fn byte_len(&self) -> u64 {
        self.members.iter().map(AddrRecord::len).sum()
    }
}

/// Partition sub-ranges by signature
///
/// Groups are sorted by signature and members by start address, so the
/// output is independent of input order.
pub fn group_by_signature(records: Vec<AddrRecord>) -> Vec<EquivalenceGroup> {
    let mut by_signature: BTreeMap<Signature, Vec<AddrRecord>> = BTreeMap::new();
    for record in records {
        by_signature
            .entry(Signature::of(&record))
            .or_default()
            .push(record);
    }

    by_signature
        .into_iter()
        .map(|(signature, mut members)| {
            members.sort_by_key(AddrRecord::start);
            EquivalenceGroup { signature, members }
        })
        .collect()
}
