//! Batch report over a long and a short station record.

use buoymon_service::analysis::batch::run_batch;
use buoymon_service::analysis::rogue::DetectionOutcome;
use buoymon_service::config::AnalysisConfig;
use buoymon_service::model::{Observation, Variable};
use buoymon_service::stations::display_name;
use chrono::{Duration, TimeZone, Utc};

/// Six years of hourly data with a storm every four days.
fn stormy_record(station: &str) -> Vec<Observation> {
    let start = Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
    let hours = (end - start).num_hours();

    (0..hours)
        .map(|h| {
            let storm = h / 96;
            let phase = h % 96;
            let u = (storm as f64 * 0.618_033_988_7).fract();
            let peak = 3.0 + 0.8 * -(1.0 - u).ln();
            let hs = if phase < 12 {
                1.5 + (peak - 1.5) * (1.0 - (phase as f64 - 6.0).abs() / 6.0)
            } else {
                1.5 + 0.3 * (h as f64 / 5.0).sin()
            };
            let rogue = phase == 6 && storm % 10 == 0;
            let wind = 8.0 + 4.0 * (h as f64 / 17.0).sin();
            Observation::new(station, start + Duration::hours(h))
                .with(Variable::WaveHeight, hs)
                .with(Variable::Hmax, if rogue { 2.3 * hs } else { 1.6 * hs })
                .with(Variable::WindSpeed, wind)
                .with(Variable::Gust, 1.3 * wind)
        })
        .collect()
}

fn short_record(station: &str) -> Vec<Observation> {
    let start = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
    (0..48)
        .map(|h| {
            Observation::new(station, start + Duration::hours(h))
                .with(Variable::WaveHeight, 1.0 + 0.01 * h as f64)
                .with(Variable::Hmax, 1.7)
        })
        .collect()
}

#[test]
fn test_report_merges_full_and_partial_stations() {
    let mut obs = short_record("M6");
    obs.extend(stormy_record("M3"));
    let report = run_batch(obs, Variable::WaveHeight, &AnalysisConfig::default());

    let ids: Vec<&str> = report.stations.iter().map(|s| s.station_id.as_str()).collect();
    assert_eq!(ids, vec!["M3", "M6"]);

    let long = &report.stations[0];
    assert_eq!(long.station_name, display_name("M3"));
    let waves = long.rogue_waves.as_ref().unwrap();
    assert_eq!(waves.outcome, DetectionOutcome::EventsFound);
    assert!(waves.events > 0 && waves.events < waves.eligible);
    assert_eq!(long.annual.years.len(), 6);
    assert!(long.annual.trend.is_some());

    let gpd = long.gpd.as_ref().expect("storm peaks should support a GPD fit");
    assert!(gpd.n_input_points >= 30);
    assert_eq!(long.gpd_return_levels.len(), 6);
    assert!(long.gpd_return_levels.iter().all(|r| r.point_estimate.is_some()));
    assert!(!report.skipped.iter().any(|u| u.station_id == "M3" && u.analysis == "gpd"));

    // Two days of data: GEV is partial, GPD is skipped, the batch carries on
    let short = &report.stations[1];
    assert!(short.gev.as_ref().is_some_and(|g| !g.is_fitted()));
    assert!(short.gev_return_levels.iter().all(|r| r.point_estimate.is_none()));
    assert!(short.gpd.is_none());
    let short_skips: Vec<&str> = report
        .skipped
        .iter()
        .filter(|u| u.station_id == "M6")
        .map(|u| u.analysis.as_str())
        .collect();
    assert_eq!(short_skips, vec!["gpd"]);
}

#[test]
fn test_report_serializes_sentinel_and_skips() {
    let report = run_batch(short_record("M2"), Variable::WaveHeight, &AnalysisConfig::default());
    let json = report.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();

    assert_eq!(value["stations"][0]["station_id"], "M2");
    assert_eq!(value["stations"][0]["gev"]["status"], "insufficient_data");
    assert_eq!(value["skipped"][0]["analysis"], "gpd");
    assert!(value["skipped"][0]["reason"].as_str().unwrap().contains("insufficient exceedances"));
}

#[test]
fn test_single_worker_matches_pool() {
    let mut obs = short_record("M1");
    obs.extend(short_record("M4"));
    obs.extend(short_record("M5"));

    let mut serial = AnalysisConfig::default();
    serial.batch.workers = 1;
    let a = run_batch(obs.clone(), Variable::WaveHeight, &serial);
    let b = run_batch(obs, Variable::WaveHeight, &AnalysisConfig::default());

    assert_eq!(a.stations, b.stations);
    assert_eq!(a.skipped, b.skipped);
}
