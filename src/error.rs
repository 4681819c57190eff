//! Error types for trace ingestion and cacheline analysis

use crate::allocation::MallocId;
use thiserror::Error;

/// Errors that can occur while loading inputs or analysing cachelines
#[derive(Error, Debug)]
pub enum CacheshareError {
    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: u64,
        expected: String,
        found: usize,
    },

    #[error("line {line}: invalid {field} value '{value}'")]
    InvalidField {
        line: u64,
        field: &'static str,
        value: String,
    },

    #[error("line {line}: access size must be at least one byte")]
    EmptyAccess { line: u64 },

    #[error("allocation {first} overlaps allocation {second}")]
    AllocationOverlap { first: MallocId, second: MallocId },

    #[error("allocation id {0} appears more than once")]
    DuplicateAllocation(MallocId),

    #[error("invariant violated in cacheline {cacheline:#x}: {reason}")]
    InvariantViolation { cacheline: u64, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for cacheshare operations
pub type Result<T> = std::result::Result<T, CacheshareError>;
