//! Trace ingestion
//!
//! Parses the flat access trace into [`AccessRecord`]s. Two row shapes are
//! accepted:
//!
//! ```text
//! thread_id, address(hex), function_id, instruction_id, size, reads, writes
//! thread_id, address(hex), function_id, instruction_id, size, is_write
//! ```
//!
//! Every field is parsed eagerly into its final type. Access sizes must be
//! between 1 and 64 bytes. A malformed row aborts
//! ingestion: silently dropping a record would corrupt the interval
//! decomposition of its cacheline.

use crate::error::{CacheshareError, Result};
use crate::record::{AccessRecord, CodeLocation, CACHELINE_SIZE};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

const COUNTS_FIELDS: usize = 7;
const WRITE_FLAG_FIELDS: usize = 6;
const PROGRESS_INTERVAL: usize = 10_000;

/// Row shape of the access trace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RecordShape {
    /// Decide per row from the number of fields
    #[default]
    Auto,
    /// Rows carry separate read and write counts
    Counts,
    /// Legacy rows carry a single write flag
    WriteFlag,
}

impl RecordShape {
    fn expected_fields(self) -> &'static str {
        match self {
            RecordShape::Auto => "6 or 7",
            RecordShape::Counts => "7",
            RecordShape::WriteFlag => "6",
        }
    }

    /// Resolve the concrete shape of a row with `found` fields
    fn resolve(self, found: usize) -> Option<RecordShape> {
        match (self, found) {
            (RecordShape::Auto, COUNTS_FIELDS) | (RecordShape::Counts, COUNTS_FIELDS) => {
                Some(RecordShape::Counts)
            }
            (RecordShape::Auto, WRITE_FLAG_FIELDS) | (RecordShape::WriteFlag, WRITE_FLAG_FIELDS) => {
                Some(RecordShape::WriteFlag)
            }
            _ => None,
        }
    }
}

/// Parse a hexadecimal address with or without a `0x` prefix
pub fn parse_hex_address(value: &str) -> Option<u64> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Parse a legacy write flag (`0`, `1`, `true`, `false`)
pub fn parse_write_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_number<T: FromStr>(value: &str, field: &'static str, line: u64) -> Result<T> {
    value.parse().map_err(|_| CacheshareError::InvalidField {
        line,
        field,
        value: value.to_string(),
    })
}

pub(crate) fn parse_address(value: &str, field: &'static str, line: u64) -> Result<u64> {
    parse_hex_address(value).ok_or_else(|| CacheshareError::InvalidField {
        line,
        field,
        value: value.to_string(),
    })
}

/// Parse one trace row
///
/// `line` is only used for error reporting.
pub fn parse_row(fields: &[&str], line: u64, shape: RecordShape) -> Result<AccessRecord> {
    let resolved = shape
        .resolve(fields.len())
        .ok_or_else(|| CacheshareError::FieldCount {
            line,
            expected: shape.expected_fields().to_string(),
            found: fields.len(),
        })?;

    let thread_id = parse_number(fields[0], "thread_id", line)?;
    let address = parse_address(fields[1], "address", line)?;
    let function_id = parse_number(fields[2], "function_id", line)?;
    let instruction_id = parse_number(fields[3], "instruction_id", line)?;
    let size: u32 = parse_number(fields[4], "size", line)?;
    if size == 0 {
        return Err(CacheshareError::EmptyAccess { line });
    }
    // A single access never spans more than one line's worth of bytes
    if u64::from(size) > CACHELINE_SIZE {
        return Err(CacheshareError::InvalidField {
            line,
            field: "size",
            value: fields[4].to_string(),
        });
    }
    if address.checked_add(u64::from(size)).is_none() {
        return Err(CacheshareError::InvalidField {
            line,
            field: "size",
            value: fields[4].to_string(),
        });
    }
    let location = CodeLocation::new(function_id, instruction_id);

    let record = match resolved {
        RecordShape::WriteFlag => {
            let is_write =
                parse_write_flag(fields[5]).ok_or_else(|| CacheshareError::InvalidField {
                    line,
                    field: "is_write",
                    value: fields[5].to_string(),
                })?;
            AccessRecord::from_write_flag(thread_id, address, size, is_write, location)
        }
        _ => {
            let reads = parse_number(fields[5], "reads", line)?;
            let writes = parse_number(fields[6], "writes", line)?;
            AccessRecord::new(thread_id, address, size, reads, writes, location)
        }
    };
    Ok(record)
}

/// CSV reader configured for headerless, comment-tolerant flat files
pub(crate) fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader)
}

/// Row made only of whitespace, which trimming turns into empty fields
pub(crate) fn is_blank(row: &csv::StringRecord) -> bool {
    row.iter().all(str::is_empty)
}

/// Read a whole trace into memory
pub fn read_trace<R: Read>(reader: R, shape: RecordShape) -> Result<Vec<AccessRecord>> {
    let mut csv = csv_reader(reader);
    let mut records = Vec::new();

    for row in csv.records() {
        let row = row?;
        if is_blank(&row) {
            continue;
        }
        let line = row.position().map_or(0, |p| p.line());
        let fields: Vec<&str> = row.iter().collect();
        records.push(parse_row(&fields, line, shape)?);

        if records.len() % PROGRESS_INTERVAL == 0 {
            tracing::debug!("trace rows read: {}", records.len());
        }
    }

    tracing::info!("ingested {} access records", records.len());
    Ok(records)
}

/// Read a trace file from disk
pub fn read_trace_file<P: AsRef<Path>>(path: P, shape: RecordShape) -> Result<Vec<AccessRecord>> {
    let file = File::open(path.as_ref())?;
    read_trace(file, shape)
}
