//! CSV output format for false-sharing reports
//!
//! Three tables separated by blank lines: one row per retained sub-range,
//! one row per implicated allocation, then a single summary row with the
//! filter stage counts and score statistics.

use crate::error::Result;
use crate::pipeline::AnalysisReport;

const SUB_RANGE_HEADER: [&str; 10] = [
    "cacheline",
    "score",
    "signature",
    "start",
    "size",
    "threads",
    "reads",
    "writes",
    "malloc_id",
    "offset",
];

const ALLOCATION_HEADER: [&str; 6] = [
    "malloc_id",
    "size",
    "site",
    "distinct_offsets",
    "cachelines",
    "total_score",
];

const SUMMARY_HEADER: [&str; 8] = [
    "total",
    "single_threaded",
    "single_group",
    "below_threshold",
    "remaining",
    "total_score",
    "max_score",
    "mean_score",
];

/// CSV output formatter
#[derive(Debug)]
pub struct CsvOutput<'a> {
    report: &'a AnalysisReport,
}

impl<'a> CsvOutput<'a> {
    pub fn new(report: &'a AnalysisReport) -> Self {
        Self { report }
    }

    /// Sub-range table
    pub fn sub_ranges_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(SUB_RANGE_HEADER)?;

        for line in &self.report.cachelines {
            for group in &line.groups {
                let signature = group
                    .signature
                    .threads()
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                for ar in &group.members {
                    let rw = ar.total_rw();
                    let threads = ar
                        .threads()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(" ");
                    let alloc = ar.allocation();
                    writer.write_record([
                        line.cacheline_id.to_string(),
                        line.score.to_string(),
                        signature.clone(),
                        format!("{:#x}", ar.start()),
                        ar.len().to_string(),
                        threads,
                        rw.reads.to_string(),
                        rw.writes.to_string(),
                        alloc.map(|a| a.malloc_id.to_string()).unwrap_or_default(),
                        alloc.map(|a| a.offset.to_string()).unwrap_or_default(),
                    ])?;
                }
            }
        }
        finish(writer)
    }

    /// Allocation table
    pub fn allocations_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(ALLOCATION_HEADER)?;

        for summary in &self.report.allocations {
            writer.write_record([
                summary.malloc_id.to_string(),
                summary.size.map(|s| s.to_string()).unwrap_or_default(),
                summary.site.map(|s| s.to_string()).unwrap_or_default(),
                summary.distinct_offsets().to_string(),
                summary.cachelines.to_string(),
                summary.total_score.to_string(),
            ])?;
        }
        finish(writer)
    }

    /// Filter counts and score statistics; mean is empty without data
    pub fn summary_csv(&self) -> Result<String> {
        let summary = &self.report.summary;
        let stats = &self.report.stats;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(SUMMARY_HEADER)?;
        writer.write_record([
            summary.total.to_string(),
            summary.single_threaded.to_string(),
            summary.single_group.to_string(),
            summary.below_threshold.to_string(),
            summary.remaining.to_string(),
            stats.total.to_string(),
            stats.max.to_string(),
            stats.mean.map(|m| format!("{:.2}", m)).unwrap_or_default(),
        ])?;
        finish(writer)
    }

    /// All three tables, separated by blank lines
    pub fn to_csv(&self) -> Result<String> {
        let mut output = self.sub_ranges_csv()?;
        output.push('\n');
        output.push_str(&self.allocations_csv()?);
        output.push('\n');
        output.push_str(&self.summary_csv()?);
        Ok(output)
    }
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
