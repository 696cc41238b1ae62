use clap::Parser;
use population_finder::population::{FileLog, PopulationConfig, PopulationResolver};
use population_finder::sheet::{read_settlements, write_results};
use std::path::PathBuf;

/// popfind — settlement population enrichment
///
/// Reads settlements (longitude, latitude, name) from a spreadsheet, looks up
/// each population via Wikidata and OpenStreetMap, and writes the enriched list.
///
/// Examples:
///   popfind cities.xlsx cities_with_population.xlsx
///   popfind cities.csv out.csv --config population.json
#[derive(Parser)]
#[command(name = "popfind", version, about, long_about = None)]
struct Cli {
    /// Input spreadsheet (.xlsx, .xls, .ods or .csv).
    input: PathBuf,

    /// Output file (.xlsx or .csv).
    output: PathBuf,

    /// JSON file overriding endpoints, delay, timeout or query scope.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PopulationConfig::load_from(path).unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }),
        None => PopulationConfig::default(),
    };

    // ── Read ────────────────────────────────────────────────────

    eprintln!("Reading {}", cli.input.display());
    let log = FileLog::new(config.log_path.clone());
    let (mut store, report) = read_settlements(&cli.input, &log).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    eprintln!(
        "Read {} settlements ({} rows skipped, {} without a name)",
        report.accepted, report.skipped, report.blank
    );

    // ── Resolve ─────────────────────────────────────────────────

    let mut resolver = PopulationResolver::from_config(&config);
    let stats = resolver.resolve_all(&mut store);
    eprint!("\n{}", stats.summary());

    // Stats JSON to stdout, emitted even if the save below fails
    match stats.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Warning: cannot serialize statistics: {}", e),
    }

    // ── Write ───────────────────────────────────────────────────

    write_results(&cli.output, &store).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
    eprintln!("Results saved to {}", cli.output.display());
}
