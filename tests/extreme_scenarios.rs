//! End-to-end extreme-value scenarios on synthetic buoy records.

use buoymon_service::analysis::extremes::{
    decluster, exceedances, fit_block_maxima, fit_gpd, fit_peaks_over_threshold, return_levels, ExtremeFit,
};
use buoymon_service::analysis::groupings::valid_points;
use buoymon_service::config::ExtremesConfig;
use buoymon_service::model::{AnalysisError, Observation, Variable};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn start(year: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
}

fn hourly_years(station: &str, first_year: i32, years: i32, variable: Variable, f: impl Fn(usize) -> f64) -> Vec<Observation> {
    let begin = start(first_year);
    let end = start(first_year + years);
    let hours = (end - begin).num_hours() as usize;
    (0..hours)
        .map(|h| Observation::new(station, begin + Duration::hours(h as i64)).with(variable, f(h)))
        .collect()
}

fn pareto_quantiles(n: usize, sigma: f64, xi: f64) -> Vec<f64> {
    (1..=n)
        .map(|i| sigma / xi * ((1.0 - (i as f64 - 0.5) / n as f64).powf(-xi) - 1.0))
        .collect()
}

/// 200 exceedances of 3 m from a GPD(1, 0.2), one every 72 hours.
fn spaced_pareto_record() -> Vec<Observation> {
    pareto_quantiles(200, 1.0, 0.2)
        .into_iter()
        .enumerate()
        .map(|(i, y)| {
            Observation::new("M3", start(2010) + Duration::hours(72 * i as i64)).with(Variable::WaveHeight, 3.0 + y)
        })
        .collect()
}

#[test]
fn test_three_year_record_yields_sentinel_with_spike_year() {
    // Hs between 2 and 4 m, one 12 m spike in the second year
    let mut obs = hourly_years("M1", 2019, 3, Variable::WaveHeight, |h| 3.0 + (h as f64 * 0.05).sin());
    let spike = obs
        .iter_mut()
        .find(|o| o.time == Utc.with_ymd_and_hms(2020, 2, 14, 6, 0, 0).unwrap())
        .unwrap();
    spike.wave_height = Some(12.0);

    let fit = fit_block_maxima(&obs, Variable::WaveHeight, &ExtremesConfig::default()).unwrap();
    assert!(!fit.is_fitted());

    let maxima = fit.annual_maxima().unwrap();
    assert_eq!(maxima.len(), 3);
    let spike_year = maxima.maxima.iter().find(|m| m.year == 2020).unwrap();
    assert_eq!(spike_year.value, 12.0);

    // The sentinel flows through return levels as null rows
    let rows = return_levels(&fit, &[10.0, 100.0], 0.95).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.point_estimate.is_none()));
    assert!(rows[0].note.as_deref().unwrap().contains("GEV annual maxima"));
}

#[test]
fn test_gev_recovers_gumbel_annual_maxima() {
    // Ten years of hourly wind whose annual maxima are Gumbel(20, 3) quantiles
    let maxima: Vec<f64> = (1..=10)
        .map(|i| 20.0 - 3.0 * (-((i as f64 - 0.5) / 10.0).ln()).ln())
        .collect();
    let mut obs = hourly_years("M5", 2010, 10, Variable::WindSpeed, |h| 8.0 + 3.0 * (h as f64 / 37.0).sin());
    for (k, value) in maxima.iter().enumerate() {
        let when = Utc.with_ymd_and_hms(2010 + k as i32, 11, 20, 15, 0, 0).unwrap();
        let row = obs.iter_mut().find(|o| o.time == when).unwrap();
        row.wind_speed = Some(*value);
    }

    let fit = fit_block_maxima(&obs, Variable::WindSpeed, &ExtremesConfig::default()).unwrap();
    let dist = fit.distribution().expect("ten years should be fitted");
    assert!(dist.shape.abs() <= 0.15, "xi = {}", dist.shape);
    assert!((dist.location.unwrap() - 20.0).abs() <= 2.0, "mu = {:?}", dist.location);
    assert!(dist.scale > 0.0 && dist.scale.is_finite());
    assert_eq!(dist.n_input_points, 10);
    assert_eq!(dist.annual_maxima.as_ref().unwrap().len(), 10);
}

#[test]
fn test_spaced_pareto_sample_survives_declustering_and_recovers_shape() {
    let obs = spaced_pareto_record();
    let points = valid_points(&obs, Variable::WaveHeight);
    let raw = exceedances(&points, 3.0);
    assert_eq!(raw.len(), 200);
    assert_eq!(decluster(&raw, 48.0), raw);

    let fit = fit_peaks_over_threshold(&obs, Variable::WaveHeight, Some(3.0), &ExtremesConfig::default()).unwrap();
    assert_eq!(fit.n_input_points, 200);
    assert!((fit.shape - 0.2).abs() <= 0.1, "xi = {}", fit.shape);
    assert!(fit.exceedance_rate.unwrap() > 0.0);
}

#[test]
fn test_fewer_than_thirty_exceedances_is_an_error() {
    let obs: Vec<Observation> = spaced_pareto_record().into_iter().take(29).collect();
    let err = fit_peaks_over_threshold(&obs, Variable::WaveHeight, Some(3.0), &ExtremesConfig::default()).unwrap_err();
    assert!(matches!(err, AnalysisError::InsufficientExceedances { needed: 30, got: 29, .. }));
    assert!(!err.is_recoverable());
}

#[test]
fn test_return_levels_non_decreasing_for_heavy_tail() {
    let obs = spaced_pareto_record();
    let dist = fit_peaks_over_threshold(&obs, Variable::WaveHeight, Some(3.0), &ExtremesConfig::default()).unwrap();
    assert!(dist.shape >= 0.0);

    let periods = [1.5, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 200.0, 500.0];
    let rows = return_levels(&ExtremeFit::from(dist), &periods, 0.95).unwrap();
    let levels: Vec<f64> = rows.iter().map(|r| r.point_estimate.unwrap()).collect();
    assert!(levels.windows(2).all(|w| w[1] >= w[0]), "{:?}", levels);
}

#[test]
fn test_iid_pareto_draws_recover_shape() {
    let mut rng = StdRng::seed_from_u64(7);
    let (sigma, xi) = (1.5, 0.2);
    let values: Vec<f64> = (0..2000)
        .map(|_| {
            let u: f64 = rng.gen_range(0.0..1.0);
            10.0 + sigma / xi * ((1.0 - u).powf(-xi) - 1.0)
        })
        .collect();

    let fit = fit_gpd(&values, 10.0, 30).unwrap();
    assert!((fit.shape - xi).abs() < 0.15, "xi = {}", fit.shape);
    assert!((fit.scale - sigma).abs() < 0.3, "sigma = {}", fit.scale);
}
