// Interval decomposition of cachelines
//
// Overlapping access ranges inside a cacheline are cut into disjoint
// sub-ranges using only their endpoints (a breakpoint sweep). Each sub-range
// aggregates per-thread and per-code-location read/write counts of every
// access that overlaps it.
//
// Example: [0,12) written by thread 0 and [4,16) written by thread 1 give
// breakpoints {0, 4, 12, 16} and three sub-ranges:
//
//   [0,4)   {0}
//   [4,12)  {0, 1}
//   [12,16) {1}

mod addr_record;
mod sweep;

pub use addr_record::{AddrRecord, AllocationRef};
pub use sweep::{breakpoints, decompose, overlaps, verify_conservation, verify_coverage};
