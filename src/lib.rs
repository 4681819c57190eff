//! Cacheshare - cacheline false-sharing detection
//!
//! Takes a trace of memory accesses (thread, address, size, read/write counts,
//! code location), splits every 64-byte cacheline into disjoint byte ranges,
//! groups those ranges by the set of threads writing them and estimates how
//! much coherence traffic comes from threads touching *different* bytes of
//! the same line. Scores are reported per cacheline and per heap allocation.

pub mod allocation;
pub mod attribution;
pub mod cacheline;
pub mod cli;
pub mod csv_output;
pub mod decompose;
pub mod equivalence;
pub mod error;
pub mod estimator;
pub mod filter;
pub mod ingest;
pub mod json_output;
pub mod pipeline;
pub mod record;
pub mod text_output;

pub use error::{CacheshareError, Result};
