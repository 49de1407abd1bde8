//! Buoy Analysis Service - Batch Report
//!
//! Runs the per-station extreme-value report over the buoy warehouse:
//! 1. Loads analysis settings (analysis.toml, defaults when absent)
//! 2. Fetches good-QC observations from PostgreSQL
//! 3. Analyzes each station on a worker pool (rogue counts, annual trend,
//!    GEV and GPD fits with return levels)
//! 4. Prints a console summary and optionally writes the JSON report
//!
//! Usage:
//!   cargo run --release
//!   cargo run --release -- --station M4 --variable wind_speed --json report.json
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use buoymon_service::analysis::batch::run_batch;
use buoymon_service::config::load_config;
use buoymon_service::logging::init_logger;
use buoymon_service::model::Variable;
use buoymon_service::store::postgres::PostgresSource;
use buoymon_service::store::{ObservationQuery, ObservationSource};
use log::LevelFilter;
use std::env;
use std::fs;

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} [--station ID] [--variable NAME] [--json PATH]", program);
    std::process::exit(1);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🌊 Buoy Extreme-Value Analysis");
    println!("==============================\n");

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let mut station: Option<String> = None;
    let mut variable = Variable::WaveHeight;
    let mut json_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match (args[i].as_str(), value) {
            ("--station", Some(v)) => station = Some(v),
            ("--variable", Some(v)) => variable = v.parse()?,
            ("--json", Some(v)) => json_path = Some(v),
            (other, _) => {
                eprintln!("Unknown or incomplete argument: {}", other);
                usage(&args[0]);
            }
        }
        i += 2;
    }

    init_logger(LevelFilter::Info, None, false)?;

    println!("⚙️  Loading analysis configuration...");
    let config = load_config()?;
    println!("✓ Configuration loaded:");
    println!("  - Workers: {}", config.batch.workers);
    println!("  - GEV minimum years: {}", config.extremes.min_years);
    println!(
        "  - POT threshold quantile: {:.2}, decluster window {} h",
        config.extremes.threshold_quantile, config.extremes.decluster_hours
    );
    println!("  - Return periods: {:?} years\n", config.extremes.return_periods);

    println!("📊 Connecting to database...");
    let mut source = PostgresSource::connect().unwrap_or_else(|e| {
        eprintln!("\n{}\n", e);
        std::process::exit(1);
    });
    println!("✓ Connected\n");

    let mut query = ObservationQuery::good_quality();
    if let Some(id) = &station {
        query = query.station(id.clone());
    }
    println!("📥 Fetching observations...");
    let observations = source.fetch(&query)?;
    println!("✓ {} good-QC observations\n", observations.len());

    if observations.is_empty() {
        println!("⚠️  Nothing to analyze");
        return Ok(());
    }

    println!("🔄 Analyzing {} per station...\n", variable);
    let report = run_batch(observations, variable, &config);

    for s in &report.stations {
        println!("📍 {} ({} observations)", s.station_name, s.n_observations);
        if let Some(r) = &s.rogue_waves {
            println!(
                "   Rogue waves: {} of {} eligible{}",
                r.events,
                r.eligible,
                r.occurrence_pct.map(|p| format!(" ({:.3}%)", p)).unwrap_or_default()
            );
        }
        if let Some(r) = &s.rogue_gusts {
            println!("   Rogue gusts: {} of {} eligible", r.events, r.eligible);
        }
        if let Some(trend) = &s.annual.trend {
            println!(
                "   Annual trend: {:+.3} {}/decade (p = {:.3}, {} years)",
                trend.slope_per_decade,
                variable.unit(),
                trend.p_value,
                trend.n_years
            );
        }
        match s.gev.as_ref().and_then(|g| g.distribution()) {
            Some(d) => println!(
                "   GEV: mu={:.2} sigma={:.2} xi={:.3}",
                d.location.unwrap_or(f64::NAN),
                d.scale,
                d.shape
            ),
            None => println!("   GEV: not fitted (insufficient annual maxima)"),
        }
        if let Some(d) = &s.gpd {
            println!(
                "   GPD: u={:.2} sigma={:.2} xi={:.3} ({} exceedances)",
                d.threshold.unwrap_or(f64::NAN),
                d.scale,
                d.shape,
                d.n_input_points
            );
        }
        let hundred = s
            .gev_return_levels
            .iter()
            .chain(&s.gpd_return_levels)
            .filter(|r| r.return_period == 100.0)
            .filter_map(|r| r.point_estimate)
            .map(|v| format!("{:.2}", v))
            .collect::<Vec<_>>();
        if !hundred.is_empty() {
            println!("   100-year level (GEV, GPD): {} {}", hundred.join(", "), variable.unit());
        }
        println!();
    }

    if !report.skipped.is_empty() {
        println!("⚠️  Skipped units:");
        for unit in &report.skipped {
            println!("   ✗ {}/{}: {}", unit.station_id, unit.analysis, unit.reason);
        }
        println!();
    }

    if let Some(path) = json_path {
        fs::write(&path, report.to_json()?)?;
        println!("💾 Report written to {}", path);
    }

    println!(
        "✓ Done: {}/{} stations complete",
        report.complete_stations(),
        report.stations.len()
    );
    Ok(())
}
