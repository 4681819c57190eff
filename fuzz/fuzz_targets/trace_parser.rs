#![no_main]

use cacheshare::allocation::NoAllocations;
use cacheshare::ingest::{read_trace, RecordShape};
use cacheshare::pipeline::{analyze, AnalysisConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Parsing must reject bad rows with an error, never panic
    if let Ok(records) = read_trace(data, RecordShape::Auto) {
        // Any trace that parses must also analyse cleanly
        let config = AnalysisConfig {
            min_score: 0,
            ..AnalysisConfig::exact()
        };
        let _ = analyze(&records, &NoAllocations, &config);
    }
});
