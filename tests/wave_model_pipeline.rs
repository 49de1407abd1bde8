//! Feature engineering, training and prediction for the wave-height model.

use buoymon_service::analysis::wave_model::features::{GUST_FACTOR, WAVE_STEEPNESS};
use buoymon_service::analysis::wave_model::{
    build_features, default_predictors, train, SteepnessClass, TARGET,
};
use buoymon_service::config::ModelConfig;
use buoymon_service::model::{AnalysisError, Observation, Variable};
use chrono::{Duration, TimeZone, Utc};
use std::f64::consts::PI;

fn wind_at(i: usize) -> f64 {
    10.0 + 8.0 * (2.0 * PI * i as f64 / 50.0).sin()
}

/// Fully populated hourly record where Hs = 0.3 × wind + 0.5.
fn windsea_record(n: usize) -> Vec<Observation> {
    let start = Utc.with_ymd_and_hms(2021, 10, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let wind = wind_at(i);
            Observation::new("M4", start + Duration::hours(i as i64))
                .with(Variable::WindSpeed, wind)
                .with(Variable::Gust, 1.3 * wind)
                .with(Variable::WavePeriod, 6.0 + 0.2 * wind)
                .with(Variable::AtmosphericPressure, 1010.0 + (i as f64 / 30.0).sin())
                .with(Variable::WindDirection, ((i * 7) % 360) as f64)
                .with(Variable::WaveHeight, 0.3 * wind + 0.5)
        })
        .collect()
}

fn quick_config() -> ModelConfig {
    ModelConfig {
        n_trees: 30,
        ..Default::default()
    }
}

#[test]
fn test_constant_sea_is_uniformly_safe() {
    let start = Utc.with_ymd_and_hms(2022, 5, 1, 0, 0, 0).unwrap();
    let obs: Vec<Observation> = (0..500)
        .map(|i| {
            Observation::new("M2", start + Duration::hours(i))
                .with(Variable::WaveHeight, 3.0)
                .with(Variable::WavePeriod, 8.0)
        })
        .collect();

    let frame = build_features(&obs, &ModelConfig::default());
    let steepness = frame.column(WAVE_STEEPNESS).unwrap();
    assert_eq!(steepness.len(), 500);
    for s in steepness {
        let s = s.unwrap();
        assert!((s - 3.0 / (1.56 * 64.0)).abs() < 1e-12);
        assert!((s - 0.0301).abs() < 1e-4);
        assert_eq!(SteepnessClass::of(Some(s)), Some(SteepnessClass::Safe));
        assert_eq!(SteepnessClass::Safe.as_str(), "safe");
    }
    // No wind reported: gust factor is null, never NaN
    assert!(frame.column(GUST_FACTOR).unwrap().iter().all(|g| g.is_none()));
}

#[test]
fn test_train_on_time_ordered_split() {
    let obs = windsea_record(300);
    let config = quick_config();
    let frame = build_features(&obs, &config);
    let predictors = default_predictors(&config.lags);

    let trained = train(&frame, &predictors, &config).unwrap();
    let eval = &trained.evaluation;

    // The first three hours lack lags and are dropped before splitting
    assert_eq!(eval.n_train + eval.n_test, 297);
    assert_eq!(eval.n_train, 207);
    assert_eq!(eval.split_time, obs[3 + 207].time);

    let overall = eval.overall.as_ref().unwrap();
    assert!(overall.r_squared.unwrap() > 0.8, "{:?}", overall);
    assert!(overall.rmse < 1.0);
    assert_eq!(eval.by_height.len(), 4);
    let bucketed: usize = eval.by_height.iter().filter_map(|b| b.metrics.as_ref()).map(|m| m.n).sum();
    assert_eq!(bucketed, eval.n_test);

    assert!(eval.oob_rmse.is_some());
    let total: f64 = eval.importance.iter().map(|f| f.importance).sum();
    assert!((total - 1.0).abs() < 1e-9);
    let top = &eval.importance[0].feature;
    assert!(!["hour", "month", "wind_dir_sin", "wind_dir_cos"].contains(&top.as_str()), "top feature {}", top);
}

#[test]
fn test_predict_fills_rows_with_complete_predictors() {
    let obs = windsea_record(300);
    let config = quick_config();
    let frame = build_features(&obs, &config);
    let trained = train(&frame, &default_predictors(&config.lags), &config).unwrap();

    let predictions = trained.model.predict(&frame).unwrap();
    assert_eq!(predictions.len(), 300);
    assert!(predictions[0].is_none());
    let actual = frame.column(TARGET).unwrap()[100].unwrap();
    assert!((predictions[100].unwrap() - actual).abs() < 0.5);
}

#[test]
fn test_missing_predictor_column_is_named() {
    let obs = windsea_record(300);
    let config = quick_config();
    let mut frame = build_features(&obs, &config);
    let trained = train(&frame, &default_predictors(&config.lags), &config).unwrap();

    frame.remove_column("gust");
    let err = trained.model.predict(&frame).unwrap_err();
    assert_eq!(err, AnalysisError::MissingPredictors(vec!["gust".to_string()]));
}

#[test]
fn test_short_record_is_insufficient() {
    let obs = windsea_record(60);
    let config = quick_config();
    let frame = build_features(&obs, &config);
    let err = train(&frame, &default_predictors(&config.lags), &config).unwrap_err();
    assert_eq!(err, AnalysisError::insufficient("wave-height model complete rows", 100, 57));
}
