/// Seasonal-trend decomposition (STL with a periodic seasonal window).
///
/// A station's series is regularized onto an hourly grid, gaps are filled by
/// linear interpolation, and the filled series is split into
/// seasonal + trend + remainder. The seasonal component repeats identically
/// from cycle to cycle; the trend is a tricube-weighted local-linear (loess)
/// smooth of the deseasonalized series. Optional robustness iterations
/// down-weight large remainders with bisquare weights.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::groupings::hourly_grid;
use crate::config::DecompositionConfig;
use crate::model::{AnalysisError, Observation, Variable};
use crate::stats;

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

/// Named seasonal cycle of an hourly series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Annual,
}

impl Frequency {
    pub fn parse(name: &str) -> Result<Self, AnalysisError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "annual" => Ok(Frequency::Annual),
            other => Err(AnalysisError::InvalidConfiguration(format!(
                "unknown decomposition frequency '{}' (expected daily, weekly, monthly or annual)",
                other
            ))),
        }
    }

    /// Samples per cycle at hourly resolution.
    pub fn period(&self) -> usize {
        match self {
            Frequency::Daily => 24,
            Frequency::Weekly => 168,
            Frequency::Monthly => 720,
            Frequency::Annual => 8766,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Annual => "annual",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecompositionRow {
    pub time: DateTime<Utc>,
    /// Observed value before gap filling.
    pub original: Option<f64>,
    pub seasonal: f64,
    pub trend: f64,
    pub remainder: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentStats {
    pub component: &'static str,
    pub mean: f64,
    pub std_dev: f64,
    /// 100 × var(component) / var(original). The three components are not
    /// normalized to sum to 100.
    pub variance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decomposition {
    pub variable: Variable,
    pub frequency: Frequency,
    pub period: usize,
    pub rows: Vec<DecompositionRow>,
    pub components: Vec<ComponentStats>,
    /// 1 − var(R)/var(S+R), clamped to [0, 1].
    pub seasonal_strength: f64,
    /// 1 − var(R)/var(T+R), clamped to [0, 1].
    pub trend_strength: f64,
}

// ---------------------------------------------------------------------------
// Decomposition
// ---------------------------------------------------------------------------

/// Decomposes one station's series of `variable`.
///
/// Fails with `InvalidConfiguration` when the observations span more than
/// one station, and with `InsufficientData` when fewer than two cycles of
/// valid samples are available.
pub fn decompose(
    observations: &[Observation],
    variable: Variable,
    frequency: Frequency,
    config: &DecompositionConfig,
) -> Result<Decomposition, AnalysisError> {
    if let Some(first) = observations.first() {
        if let Some(other) = observations.iter().find(|o| o.station_id != first.station_id) {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "decomposition expects a single station, got {} and {}",
                first.station_id, other.station_id
            )));
        }
    }

    let period = frequency.period();
    let grid = hourly_grid(observations, variable);
    let original: Vec<Option<f64>> = grid.iter().map(|(_, v)| *v).collect();
    let valid: Vec<f64> = original.iter().flatten().copied().collect();

    let needed = 2 * period;
    if valid.len() < needed {
        return Err(AnalysisError::insufficient(
            format!("STL decomposition ({})", frequency),
            needed,
            valid.len(),
        ));
    }

    let filled = interpolate_gaps(&original);
    let (seasonal, trend, remainder) = stl_periodic(&filled, period, config);

    let original_var = stats::variance(&valid);
    let components = [("seasonal", &seasonal), ("trend", &trend), ("remainder", &remainder)]
        .into_iter()
        .map(|(component, values)| ComponentStats {
            component,
            mean: stats::mean(values),
            std_dev: stats::std_dev(values),
            variance_pct: if original_var > 0.0 {
                100.0 * stats::variance(values) / original_var
            } else {
                0.0
            },
        })
        .collect();

    let seasonal_strength = strength(&seasonal, &remainder);
    let trend_strength = strength(&trend, &remainder);

    log::debug!(
        "STL {} on {} hourly points: seasonal strength {:.3}, trend strength {:.3}",
        frequency,
        filled.len(),
        seasonal_strength,
        trend_strength
    );

    let rows = grid
        .iter()
        .enumerate()
        .map(|(i, (time, value))| DecompositionRow {
            time: *time,
            original: *value,
            seasonal: seasonal[i],
            trend: trend[i],
            remainder: remainder[i],
        })
        .collect();

    Ok(Decomposition {
        variable,
        frequency,
        period,
        rows,
        components,
        seasonal_strength,
        trend_strength,
    })
}

/// [`decompose`] at the cycle named in `config.frequency`.
pub fn decompose_with_config(
    observations: &[Observation],
    variable: Variable,
    config: &DecompositionConfig,
) -> Result<Decomposition, AnalysisError> {
    decompose(observations, variable, config.frequency()?, config)
}

fn strength(component: &[f64], remainder: &[f64]) -> f64 {
    let combined: Vec<f64> = component.iter().zip(remainder).map(|(c, r)| c + r).collect();
    let denom = stats::variance(&combined);
    if !(denom > 0.0) {
        return 0.0;
    }
    (1.0 - stats::variance(remainder) / denom).clamp(0.0, 1.0)
}

/// Linear interpolation across gaps; leading and trailing gaps take the
/// nearest valid value.
pub fn interpolate_gaps(values: &[Option<f64>]) -> Vec<f64> {
    let known: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .collect();
    let Some(&(_, first_val)) = known.first() else {
        return vec![f64::NAN; values.len()];
    };
    let (last_idx, last_val) = known[known.len() - 1];

    let mut out = vec![first_val; values.len()];
    for pair in known.windows(2) {
        let (i0, v0) = pair[0];
        let (i1, v1) = pair[1];
        for (i, slot) in out.iter_mut().enumerate().take(i1 + 1).skip(i0) {
            let frac = (i - i0) as f64 / (i1 - i0) as f64;
            *slot = v0 + (v1 - v0) * frac;
        }
    }
    out[last_idx] = last_val;
    for slot in out.iter_mut().skip(last_idx + 1) {
        *slot = last_val;
    }
    out
}

// ---------------------------------------------------------------------------
// STL core
// ---------------------------------------------------------------------------

/// Smallest odd integer ≥ x.
fn next_odd(x: f64) -> usize {
    let n = x.ceil().max(3.0) as usize;
    if n % 2 == 0 { n + 1 } else { n }
}

fn stl_periodic(y: &[f64], period: usize, config: &DecompositionConfig) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let n = y.len();
    let trend_window = next_odd(1.5 * period as f64);
    let jump = trend_window.div_ceil(10).max(1);
    let inner = config.inner_iterations.max(1);

    let mut weights = vec![1.0; n];
    let mut trend = vec![0.0; n];
    let mut seasonal = vec![0.0; n];

    for outer in 0..=config.robust_iterations {
        for _ in 0..inner {
            // Cycle-subseries means of the detrended series, centered over one cycle.
            let mut sums = vec![0.0; period];
            let mut totals = vec![0.0; period];
            for i in 0..n {
                sums[i % period] += weights[i] * (y[i] - trend[i]);
                totals[i % period] += weights[i];
            }
            let mut cycle: Vec<f64> = sums
                .iter()
                .zip(&totals)
                .map(|(s, w)| if *w > 0.0 { s / w } else { 0.0 })
                .collect();
            let level = stats::mean(&cycle);
            cycle.iter_mut().for_each(|c| *c -= level);
            seasonal = (0..n).map(|i| cycle[i % period]).collect();

            let deseasonalized: Vec<f64> = y.iter().zip(&seasonal).map(|(v, s)| v - s).collect();
            trend = loess(&deseasonalized, trend_window, &weights, jump);
        }

        if outer < config.robust_iterations {
            let residuals: Vec<f64> = (0..n).map(|i| y[i] - seasonal[i] - trend[i]).collect();
            weights = robustness_weights(&residuals);
        }
    }

    let remainder = (0..n).map(|i| y[i] - seasonal[i] - trend[i]).collect();
    (seasonal, trend, remainder)
}

/// Bisquare weights on |r| / (6 · median|r|).
fn robustness_weights(residuals: &[f64]) -> Vec<f64> {
    let abs: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
    let h = 6.0 * stats::median(&abs);
    abs.iter()
        .map(|a| {
            if h <= 0.0 {
                1.0
            } else {
                let u = a / h;
                if u < 1.0 { (1.0 - u * u).powi(2) } else { 0.0 }
            }
        })
        .collect()
}

/// Local-linear tricube smoother with a `window`-point neighbourhood.
/// Fits are computed every `jump` points and linearly interpolated between.
fn loess(y: &[f64], window: usize, weights: &[f64], jump: usize) -> Vec<f64> {
    let n = y.len();
    if n == 0 {
        return Vec::new();
    }

    let mut anchors: Vec<usize> = (0..n).step_by(jump).collect();
    if anchors.last() != Some(&(n - 1)) {
        anchors.push(n - 1);
    }
    let fitted: Vec<f64> = anchors.iter().map(|&x| local_linear(y, window, weights, x)).collect();

    let mut out = vec![0.0; n];
    out[anchors[0]] = fitted[0];
    for k in 0..anchors.len() - 1 {
        let (i0, i1) = (anchors[k], anchors[k + 1]);
        let (v0, v1) = (fitted[k], fitted[k + 1]);
        for (i, slot) in out.iter_mut().enumerate().take(i1 + 1).skip(i0) {
            *slot = v0 + (v1 - v0) * (i - i0) as f64 / (i1 - i0) as f64;
        }
    }
    out
}

fn local_linear(y: &[f64], window: usize, weights: &[f64], x0: usize) -> f64 {
    let n = y.len();
    let q = window.min(n);
    let lo = x0.saturating_sub(q / 2).min(n - q);
    let hi = lo + q - 1;
    let mut h = (x0 - lo).max(hi - x0) as f64;
    if window > n {
        h += ((window - n) / 2) as f64;
    }
    h += 1.0;

    let local: Vec<(f64, f64, f64)> = (lo..=hi)
        .map(|j| {
            let r = (j as f64 - x0 as f64).abs() / h;
            let w = (1.0 - r.powi(3)).powi(3) * weights[j];
            (j as f64, y[j], w)
        })
        .collect();

    let sw: f64 = local.iter().map(|(_, _, w)| w).sum();
    if sw <= 0.0 {
        return y[x0];
    }
    let xb = local.iter().map(|(x, _, w)| w * x).sum::<f64>() / sw;
    let yb = local.iter().map(|(_, v, w)| w * v).sum::<f64>() / sw;
    let sxx: f64 = local.iter().map(|(x, _, w)| w * (x - xb).powi(2)).sum();
    if sxx <= 1e-12 {
        return yb;
    }
    let sxy: f64 = local.iter().map(|(x, v, w)| w * (x - xb) * (v - yb)).sum();
    yb + sxy / sxx * (x0 as f64 - xb)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::f64::consts::PI;

    fn hourly(n: usize, f: impl Fn(usize) -> Option<f64>) -> Vec<Observation> {
        let start = Utc.with_ymd_and_hms(2021, 4, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let mut obs = Observation::new("M5", start + Duration::hours(i as i64));
                obs.air_temperature = f(i);
                obs
            })
            .collect()
    }

    #[test]
    fn test_frequency_names() {
        assert_eq!(Frequency::parse("daily").unwrap().period(), 24);
        assert_eq!(Frequency::parse("Weekly").unwrap().period(), 168);
        assert_eq!(Frequency::parse("monthly").unwrap().period(), 720);
        assert_eq!(Frequency::parse("annual").unwrap().period(), 8766);
        assert!(matches!(
            Frequency::parse("fortnightly"),
            Err(AnalysisError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_recovers_daily_cycle_on_linear_trend() {
        let obs = hourly(240, |i| Some(10.0 + 0.001 * i as f64 + 2.0 * (2.0 * PI * i as f64 / 24.0).sin()));
        let d = decompose(&obs, Variable::AirTemperature, Frequency::Daily, &DecompositionConfig::default()).unwrap();

        assert_eq!(d.rows.len(), 240);
        for i in 0..216 {
            assert_eq!(d.rows[i].seasonal, d.rows[i + 24].seasonal);
        }
        let peak = d.rows.iter().map(|r| r.seasonal).fold(f64::MIN, f64::max);
        assert!((peak - 2.0).abs() < 0.05, "seasonal peak {}", peak);
        assert!(d.rows.iter().all(|r| r.remainder.abs() < 0.05));
        assert!((d.rows[0].trend - 10.0).abs() < 0.05);
        assert!(d.seasonal_strength > 0.99);
    }

    #[test]
    fn test_components_sum_to_filled_series() {
        let obs = hourly(96, |i| Some((i % 7) as f64 + (i as f64 / 10.0).cos()));
        let d = decompose(&obs, Variable::AirTemperature, Frequency::Daily, &DecompositionConfig::default()).unwrap();
        for row in &d.rows {
            let total = row.seasonal + row.trend + row.remainder;
            assert!((total - row.original.unwrap()).abs() < 1e-9);
        }
        assert_eq!(d.components.len(), 3);
    }

    #[test]
    fn test_gaps_are_filled_but_original_stays_missing() {
        let obs = hourly(72, |i| if (30..34).contains(&i) { None } else { Some(5.0 + (i % 24) as f64) });
        let d = decompose(&obs, Variable::AirTemperature, Frequency::Daily, &DecompositionConfig::default()).unwrap();
        assert_eq!(d.rows.len(), 72);
        assert!(d.rows[31].original.is_none());
        assert!(d.rows[31].trend.is_finite());
    }

    #[test]
    fn test_too_few_samples_is_insufficient_data() {
        let obs = hourly(30, |i| Some(i as f64));
        let err = decompose(&obs, Variable::AirTemperature, Frequency::Daily, &DecompositionConfig::default()).unwrap_err();
        assert_eq!(err, AnalysisError::insufficient("STL decomposition (daily)", 48, 30));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_configured_frequency_sets_the_period() {
        let obs = hourly(400, |i| Some((2.0 * PI * i as f64 / 168.0).sin()));
        let weekly = DecompositionConfig { frequency: "weekly".to_string(), ..Default::default() };
        let d = decompose_with_config(&obs, Variable::AirTemperature, &weekly).unwrap();
        assert_eq!(d.frequency, Frequency::Weekly);
        assert_eq!(d.period, 168);
        assert_eq!(d.rows[10].seasonal, d.rows[178].seasonal);

        let bad = DecompositionConfig { frequency: "hourly".to_string(), ..Default::default() };
        assert!(matches!(
            decompose_with_config(&obs, Variable::AirTemperature, &bad),
            Err(AnalysisError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_mixed_stations_are_rejected() {
        let mut obs = hourly(72, |i| Some(i as f64));
        obs[40].station_id = "M2".to_string();
        let err = decompose(&obs, Variable::AirTemperature, Frequency::Daily, &DecompositionConfig::default()).unwrap_err();
        match err {
            AnalysisError::InvalidConfiguration(msg) => assert!(msg.contains("M5") && msg.contains("M2")),
            other => panic!("expected InvalidConfiguration, got {:?}", other),
        }
    }

    #[test]
    fn test_interpolate_gaps_clamps_ends() {
        let filled = interpolate_gaps(&[None, Some(1.0), None, Some(3.0), None]);
        assert_eq!(filled, vec![1.0, 1.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn test_robust_iterations_limit_outlier_influence() {
        let series = |i: usize| {
            let base = 3.0 * (2.0 * PI * i as f64 / 24.0).sin();
            Some(if i == 100 { base + 40.0 } else { base })
        };
        let obs = hourly(240, series);
        let robust = DecompositionConfig { robust_iterations: 3, ..Default::default() };
        let plain = decompose(&obs, Variable::AirTemperature, Frequency::Daily, &DecompositionConfig::default()).unwrap();
        let fitted = decompose(&obs, Variable::AirTemperature, Frequency::Daily, &robust).unwrap();
        assert!(fitted.rows[100].remainder > plain.rows[100].remainder);
        assert!(fitted.rows[100].remainder > 35.0);
    }
}
