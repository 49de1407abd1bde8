//! Wave-Height Model Training
//!
//! Engineers features from the buoy record, trains the random-forest
//! wave-height regressor on the earliest part of the record and evaluates it
//! on the rest.
//!
//! Usage:
//!   cargo run --release --bin train_wave_model
//!
//! Options:
//!   --station ID        Train on one station only (repeatable)
//!   --trees N           Override the configured tree count
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use buoymon_service::analysis::wave_model::{build_features, default_predictors, train, Metrics};
use buoymon_service::config::load_config;
use buoymon_service::logging::init_logger;
use buoymon_service::store::postgres::PostgresSource;
use buoymon_service::store::{ObservationQuery, ObservationSource};
use log::LevelFilter;
use std::env;

fn describe(metrics: &Option<Metrics>) -> String {
    match metrics {
        Some(m) => format!(
            "n={:<6} RMSE={:.3}  MAE={:.3}  R²={}  bias={:+.3}",
            m.n,
            m.rmse,
            m.mae,
            m.r_squared.map_or("n/a".to_string(), |r| format!("{:.3}", r)),
            m.bias
        ),
        None => "no rows".to_string(),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🌊 Wave-Height Model Training");
    println!("=============================\n");

    let args: Vec<String> = env::args().collect();
    let stations: Vec<String> = args
        .windows(2)
        .filter(|w| w[0] == "--station")
        .map(|w| w[1].clone())
        .collect();
    let trees: Option<usize> = args
        .iter()
        .position(|a| a == "--trees")
        .and_then(|i| args.get(i + 1))
        .map(|n| n.parse())
        .transpose()?;

    init_logger(LevelFilter::Info, None, false)?;

    let mut config = load_config()?;
    if let Some(n) = trees {
        config.model.n_trees = n;
    }

    println!("📊 Connecting to database...");
    let mut source = PostgresSource::connect().unwrap_or_else(|e| {
        eprintln!("\n{}\n", e);
        std::process::exit(1);
    });
    let mut query = ObservationQuery::good_quality();
    for id in &stations {
        query = query.station(id.clone());
    }
    let observations = source.fetch(&query)?;
    println!("✓ {} observations\n", observations.len());

    println!("🛠️  Engineering features (lags {:?} h)...", config.model.lags);
    let frame = build_features(&observations, &config.model);
    let predictors = default_predictors(&config.model.lags);
    println!("✓ {} rows, {} predictors\n", frame.len(), predictors.len());

    println!("🌲 Training {} trees...", config.model.n_trees);
    let trained = train(&frame, &predictors, &config.model)?;
    let eval = &trained.evaluation;
    println!(
        "✓ {} training rows, {} held-out rows (from {})\n",
        eval.n_train,
        eval.n_test,
        eval.split_time.format("%Y-%m-%d %H:%M")
    );

    println!("📈 Held-out performance");
    println!("   overall   {}", describe(&eval.overall));
    for bucket in &eval.by_height {
        println!("   {:<9} {}", bucket.bucket, describe(&bucket.metrics));
    }
    if let (Some(r2), Some(rmse)) = (eval.oob_r_squared, eval.oob_rmse) {
        println!("   out-of-bag R²={:.3} RMSE={:.3}", r2, rmse);
    }

    println!("\n🔎 Feature importance");
    for f in &eval.importance {
        println!("   {:<24} {:.3}", f.feature, f.importance);
    }

    Ok(())
}
