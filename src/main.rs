use anyhow::{Context, Result};
use cacheshare::allocation::{AllocationResolver, AllocationTable, NoAllocations};
use cacheshare::cli::{Cli, OutputFormat};
use cacheshare::csv_output::CsvOutput;
use cacheshare::ingest::read_trace_file;
use cacheshare::json_output::JsonOutput;
use cacheshare::pipeline::{analyze, AnalysisConfig};
use cacheshare::text_output::TextOutput;
use clap::Parser;
use std::fs;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(args: &Cli) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_toml(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    args.apply_overrides(&mut config);
    config.validate().context("Invalid analysis configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = load_config(&args)?;

    let records = read_trace_file(&args.trace, config.record_shape)
        .with_context(|| format!("Failed to read trace: {}", args.trace.display()))?;

    let table = match &args.allocations {
        Some(path) => Some(
            AllocationTable::from_file(path)
                .with_context(|| format!("Failed to load allocations: {}", path.display()))?,
        ),
        None => None,
    };
    let resolver: &dyn AllocationResolver = match &table {
        Some(table) => table,
        None => &NoAllocations,
    };

    let report = analyze(&records, resolver, &config).context("Analysis failed")?;

    let rendered = match args.format {
        OutputFormat::Text => {
            let text = TextOutput::new(&report);
            match &table {
                Some(table) => text.with_known_allocations(table.len()).render(),
                None => text.render(),
            }
        }
        OutputFormat::Json => JsonOutput::from_report(&report).to_json()?,
        OutputFormat::Csv => CsvOutput::new(&report).to_csv()?,
    };

    match &args.output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("Failed to write report: {}", path.display()))?,
        None => print!("{}", rendered),
    }

    Ok(())
}
