/// Calendar aggregates, long-term trend and anomaly detection.
///
/// Monthly and seasonal climatologies bucket valid values by calendar month
/// and meteorological season. Annual aggregates carry an ordinary
/// least-squares trend of the annual mean against year. Anomalies are
/// z-scores against the observation's calendar-month baseline.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::TrendConfig;
use crate::model::{Observation, Season, Variable};
use crate::stats;

// ---------------------------------------------------------------------------
// Monthly / seasonal climatology
// ---------------------------------------------------------------------------

/// Mean, standard deviation, median and count of one calendar bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketStats {
    pub n: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
}

impl BucketStats {
    fn of(values: &[f64]) -> Self {
        Self {
            n: values.len(),
            mean: stats::mean(values),
            std_dev: stats::std_dev(values),
            median: stats::median(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyStats {
    pub month: u32,
    #[serde(flatten)]
    pub stats: BucketStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalStats {
    pub season: Season,
    pub label: &'static str,
    #[serde(flatten)]
    pub stats: BucketStats,
}

fn bucket_by<K: Ord>(observations: &[Observation], variable: Variable, key: impl Fn(&DateTime<Utc>) -> K) -> BTreeMap<K, Vec<f64>> {
    let mut buckets: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for obs in observations {
        if let Some(v) = obs.value(variable) {
            buckets.entry(key(&obs.time)).or_default().push(v);
        }
    }
    buckets
}

/// Calendar-month climatology, months with data only, January first.
pub fn monthly_stats(observations: &[Observation], variable: Variable) -> Vec<MonthlyStats> {
    bucket_by(observations, variable, |t| t.month())
        .into_iter()
        .map(|(month, values)| MonthlyStats {
            month,
            stats: BucketStats::of(&values),
        })
        .collect()
}

/// Seasonal climatology in DJF, MAM, JJA, SON order.
pub fn seasonal_stats(observations: &[Observation], variable: Variable) -> Vec<SeasonalStats> {
    bucket_by(observations, variable, Season::of)
        .into_iter()
        .map(|(season, values)| SeasonalStats {
            season,
            label: season.as_str(),
            stats: BucketStats::of(&values),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Annual aggregates and trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualStats {
    pub year: i32,
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub max: f64,
    pub p90: f64,
    pub p99: f64,
}

/// Linear trend of the annual mean.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualTrend {
    /// OLS slope × 10 (units per decade).
    pub slope_per_decade: f64,
    pub p_value: f64,
    pub r_squared: f64,
    pub n_years: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualSummary {
    pub variable: Variable,
    pub years: Vec<AnnualStats>,
    /// `None` when fewer years than the configured minimum are available.
    pub trend: Option<AnnualTrend>,
}

pub fn annual_stats(observations: &[Observation], variable: Variable, config: &TrendConfig) -> AnnualSummary {
    let years: Vec<AnnualStats> = bucket_by(observations, variable, |t| t.year())
        .into_iter()
        .filter_map(|(year, values)| {
            let s = stats::Summary::of(&values)?;
            Some(AnnualStats {
                year,
                n: s.n,
                mean: s.mean,
                median: s.median,
                std_dev: s.std_dev,
                max: s.max,
                p90: s.p90,
                p99: s.p99,
            })
        })
        .collect();

    let trend = if years.len() >= config.min_years_for_trend.max(3) {
        let x: Vec<f64> = years.iter().map(|y| y.year as f64).collect();
        let y: Vec<f64> = years.iter().map(|y| y.mean).collect();
        stats::linear_regression(&x, &y).map(|fit| AnnualTrend {
            slope_per_decade: fit.slope * 10.0,
            p_value: fit.p_value,
            r_squared: fit.r_squared,
            n_years: fit.n,
        })
    } else {
        log::debug!(
            "{}: {} annual points, trend needs {}",
            variable,
            years.len(),
            config.min_years_for_trend
        );
        None
    };

    AnnualSummary { variable, years, trend }
}

// ---------------------------------------------------------------------------
// Anomalies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub station_id: String,
    pub time: DateTime<Utc>,
    pub value: f64,
    pub month: u32,
    pub baseline_mean: f64,
    pub baseline_std_dev: f64,
    pub z_score: f64,
}

/// Observations whose |z| against their calendar month exceeds the
/// configured threshold, largest |z| first.
///
/// Months whose baseline has no spread produce no anomalies.
pub fn detect_anomalies(observations: &[Observation], variable: Variable, config: &TrendConfig) -> Vec<Anomaly> {
    let baselines: BTreeMap<u32, (f64, f64)> = bucket_by(observations, variable, |t| t.month())
        .into_iter()
        .map(|(month, values)| (month, (stats::mean(&values), stats::std_dev(&values))))
        .collect();

    let mut anomalies: Vec<Anomaly> = observations
        .iter()
        .filter_map(|obs| {
            let value = obs.value(variable)?;
            let month = obs.time.month();
            let &(mean, sd) = baselines.get(&month)?;
            if !(sd > 0.0) {
                return None;
            }
            let z_score = (value - mean) / sd;
            (z_score.abs() > config.anomaly_z_threshold).then(|| Anomaly {
                station_id: obs.station_id.clone(),
                time: obs.time,
                value,
                month,
                baseline_mean: mean,
                baseline_std_dev: sd,
                z_score,
            })
        })
        .collect();

    anomalies.sort_by(|a, b| b.z_score.abs().total_cmp(&a.z_score.abs()));
    anomalies
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn obs(time: DateTime<Utc>, value: f64) -> Observation {
        Observation::new("M6", time).with(Variable::SeaTemperature, value)
    }

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_monthly_and_seasonal_buckets() {
        let rows = vec![
            obs(date(2020, 1, 5), 9.0),
            obs(date(2020, 1, 6), 11.0),
            obs(date(2020, 7, 1), 16.0),
            obs(date(2020, 12, 1), 10.0),
        ];
        let monthly = monthly_stats(&rows, Variable::SeaTemperature);
        assert_eq!(monthly.len(), 3);
        assert_eq!(monthly[0].month, 1);
        assert_eq!(monthly[0].stats.n, 2);
        assert_eq!(monthly[0].stats.mean, 10.0);

        let seasonal = seasonal_stats(&rows, Variable::SeaTemperature);
        assert_eq!(seasonal[0].label, "DJF");
        assert_eq!(seasonal[0].stats.n, 3);
        assert_eq!(seasonal[1].label, "JJA");
    }

    #[test]
    fn test_annual_trend_per_decade() {
        let rows: Vec<_> = (0..5)
            .flat_map(|k| {
                let year = 2015 + k;
                let level = 10.0 + 0.05 * k as f64;
                vec![obs(date(year, 3, 1), level - 1.0), obs(date(year, 9, 1), level + 1.0)]
            })
            .collect();
        let summary = annual_stats(&rows, Variable::SeaTemperature, &TrendConfig::default());
        assert_eq!(summary.years.len(), 5);
        let trend = summary.trend.expect("five years are enough");
        assert!((trend.slope_per_decade - 0.5).abs() < 1e-9);
        assert!((trend.r_squared - 1.0).abs() < 1e-9);
        assert_eq!(summary.years[0].max, 11.0);
    }

    #[test]
    fn test_annual_trend_undefined_below_three_years() {
        let rows = vec![obs(date(2020, 1, 1), 1.0), obs(date(2021, 1, 1), 2.0)];
        let summary = annual_stats(&rows, Variable::SeaTemperature, &TrendConfig::default());
        assert_eq!(summary.years.len(), 2);
        assert!(summary.trend.is_none());
    }

    #[test]
    fn test_anomalies_sorted_by_absolute_z() {
        let start = date(2021, 2, 1);
        let mut rows: Vec<_> = (0..200)
            .map(|i| obs(start + Duration::hours(i), if i % 2 == 0 { 9.0 } else { 11.0 }))
            .collect();
        rows.push(obs(start + Duration::hours(300), 20.0));
        rows.push(obs(start + Duration::hours(301), -2.0));

        let anomalies = detect_anomalies(&rows, Variable::SeaTemperature, &TrendConfig::default());
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[0].value, -2.0);
        assert!(anomalies[0].z_score < 0.0);
        assert!(anomalies[0].z_score.abs() >= anomalies[1].z_score.abs());
    }
}
