//! Return Level Report
//!
//! Fits GEV (annual maxima) and GPD (peaks over threshold) distributions to
//! one station's record and prints the return-level tables and curve.
//!
//! Usage:
//!   cargo run --bin return_levels -- --station M4
//!
//! Options:
//!   --station ID        Station to analyze (required)
//!   --variable NAME     Measurement column (default: wave_height)
//!   --threshold VALUE   POT threshold (default: configured quantile)
//!   --mrl               Also print the mean residual life table
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use buoymon_service::analysis::extremes::{
    fit_block_maxima, fit_peaks_over_threshold, mean_residual_life, return_level_curve, return_levels,
    ExtremeFit, ReturnLevelEstimate,
};
use buoymon_service::analysis::groupings::valid_values;
use buoymon_service::config::load_config;
use buoymon_service::model::Variable;
use buoymon_service::stations::display_name;
use buoymon_service::store::postgres::PostgresSource;
use buoymon_service::store::{ObservationQuery, ObservationSource};
use std::env;

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned()
}

fn print_table(rows: &[ReturnLevelEstimate], unit: &str) {
    println!("   {:>8}  {:>10}  {:>21}", "Period", "Level", "95% interval");
    for row in rows {
        let level = row.point_estimate.map_or("-".to_string(), |v| format!("{:.2} {}", v, unit));
        let ci = match (row.lower_ci, row.upper_ci) {
            (Some(lo), Some(hi)) => format!("[{:.2}, {:.2}]", lo, hi),
            _ => row.note.clone().unwrap_or_else(|| "-".to_string()),
        };
        println!("   {:>7.1}y  {:>10}  {:>21}", row.return_period, level, ci);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🌊 Return Level Report");
    println!("======================\n");

    let args: Vec<String> = env::args().collect();
    let Some(station) = arg_value(&args, "--station") else {
        eprintln!("Usage: {} --station ID [--variable NAME] [--threshold VALUE] [--mrl]", args[0]);
        std::process::exit(1);
    };
    let variable: Variable = match arg_value(&args, "--variable") {
        Some(name) => name.parse()?,
        None => Variable::WaveHeight,
    };
    let threshold: Option<f64> = arg_value(&args, "--threshold").map(|t| t.parse()).transpose()?;
    let show_mrl = args.iter().any(|a| a == "--mrl");

    let config = load_config()?;
    let extremes = &config.extremes;

    println!("📊 Connecting to database...");
    let mut source = PostgresSource::connect().unwrap_or_else(|e| {
        eprintln!("\n{}\n", e);
        std::process::exit(1);
    });
    let query = ObservationQuery::good_quality().station(station.clone()).select(&[variable]);
    let observations = source.fetch(&query)?;
    println!("✓ {} observations for {}\n", observations.len(), display_name(&station));

    // Block maxima
    println!("📈 GEV (annual maxima)");
    let gev = fit_block_maxima(&observations, variable, extremes)?;
    if let Some(series) = gev.annual_maxima() {
        for m in &series.maxima {
            println!("   {}  {:.2} {}  ({})", m.year, m.value, variable.unit(), m.time.format("%Y-%m-%d %H:%M"));
        }
    }
    match &gev {
        ExtremeFit::Fitted(d) => println!(
            "   mu={:.3} sigma={:.3} xi={:.3}  AIC={:.1}",
            d.location.unwrap_or(f64::NAN),
            d.scale,
            d.shape,
            d.aic
        ),
        ExtremeFit::InsufficientData { reason, .. } => println!("   ⚠️  {}", reason),
    }
    print_table(&return_levels(&gev, &extremes.return_periods, extremes.confidence_level)?, variable.unit());
    println!();

    // Peaks over threshold
    println!("📈 GPD (peaks over threshold)");
    match fit_peaks_over_threshold(&observations, variable, threshold, extremes) {
        Ok(dist) => {
            println!(
                "   u={:.3} sigma={:.3} xi={:.3}  {} exceedances, {:.2}/year  AIC={:.1}",
                dist.threshold.unwrap_or(f64::NAN),
                dist.scale,
                dist.shape,
                dist.n_input_points,
                dist.exceedance_rate.unwrap_or(f64::NAN),
                dist.aic
            );
            let fit = ExtremeFit::from(dist);
            print_table(&return_levels(&fit, &extremes.return_periods, extremes.confidence_level)?, variable.unit());

            println!("\n📉 GPD return-level curve");
            let curve = return_level_curve(&fit, extremes.curve_max_period, extremes.curve_points, extremes.confidence_level)?;
            for row in curve.iter().step_by(5) {
                if let Some(v) = row.point_estimate {
                    println!("   {:>7.1}y  {:.2}", row.return_period, v);
                }
            }
        }
        Err(e) => println!("   ✗ {}", e),
    }

    if show_mrl {
        println!("\n🔎 Mean residual life");
        let values = valid_values(&observations, variable);
        for point in mean_residual_life(&values, 0.80, 0.995, 20) {
            println!(
                "   u={:.3}  mean excess={:.3}  n={}",
                point.threshold, point.mean_excess, point.n_exceedances
            );
        }
    }

    Ok(())
}
