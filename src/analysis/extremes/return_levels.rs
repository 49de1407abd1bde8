/// Return levels with delta-method confidence intervals.
///
/// For each return period the point estimate is the fitted level exceeded on
/// average once per period. Its variance is gᵀ Σ g, with g the numerical
/// gradient of the level in the natural parameters and Σ the fit's
/// covariance. The GPD exceedance rate is treated as known.

use serde::Serialize;

use super::{ExtremeFit, FittedDistribution, SHAPE_EPS};
use crate::model::AnalysisError;
use crate::optimize::numerical_gradient;
use crate::stats::normal_critical_value;

/// Shortest period on a return-level curve.
pub const CURVE_MIN_PERIOD: f64 = 1.1;

/// Finite-difference step in ξ, well above `SHAPE_EPS`.
const SHAPE_STEP: f64 = 1e-4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnLevelEstimate {
    pub return_period: f64,
    pub point_estimate: Option<f64>,
    pub lower_ci: Option<f64>,
    pub upper_ci: Option<f64>,
    /// Why the row is (partly) null, if it is.
    pub note: Option<String>,
}

impl ReturnLevelEstimate {
    fn null(return_period: f64, note: impl Into<String>) -> Self {
        Self {
            return_period,
            point_estimate: None,
            lower_ci: None,
            upper_ci: None,
            note: Some(note.into()),
        }
    }
}

fn validate(periods: &[f64], confidence_level: f64) -> Result<(), AnalysisError> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(AnalysisError::InvalidConfiguration(format!(
            "confidence level must be in (0, 1), got {}",
            confidence_level
        )));
    }
    if let Some(p) = periods.iter().find(|p| !(**p > 1.0) || !p.is_finite()) {
        return Err(AnalysisError::InvalidConfiguration(format!(
            "return periods must be finite and exceed 1 year, got {}",
            p
        )));
    }
    Ok(())
}

fn estimate(dist: &FittedDistribution, period: f64, z: f64) -> ReturnLevelEstimate {
    let Some(point) = dist.return_level(period) else {
        let note = if dist.exceedance_rate.is_none() && dist.threshold.is_some() {
            "exceedance rate unknown"
        } else {
            "return level not finite"
        };
        return ReturnLevelEstimate::null(period, note);
    };

    let params = dist.parameters();
    let half_width = dist.covariance.as_ref().and_then(|cov| {
        let level = |p: &[f64]| dist.return_level_with(p, period).unwrap_or(f64::NAN);
        let mut grad = numerical_gradient(level, &params);
        let last = grad.len() - 1;
        grad[last] = shape_derivative(level, &params);
        let variance: f64 = (0..grad.len())
            .flat_map(|i| (0..grad.len()).map(move |j| (i, j)))
            .map(|(i, j)| grad[i] * cov[i][j] * grad[j])
            .sum();
        (variance.is_finite() && variance >= 0.0).then(|| z * variance.sqrt())
    });

    ReturnLevelEstimate {
        return_period: period,
        point_estimate: Some(point),
        lower_ci: half_width.map(|h| point - h),
        upper_ci: half_width.map(|h| point + h),
        note: half_width.is_none().then(|| "confidence interval unavailable".to_string()),
    }
}

/// d(level)/dξ, with ξ last in `params`.
///
/// Both evaluation points stay on the same side of the ξ ≈ 0 formula
/// switch: the difference is central unless a step would land within
/// `SHAPE_EPS` of zero, in which case it is one-sided away from zero.
fn shape_derivative(level: impl Fn(&[f64]) -> f64, params: &[f64]) -> f64 {
    let k = params.len() - 1;
    let xi = params[k];
    let at = |x: f64| {
        let mut p = params.to_vec();
        p[k] = x;
        level(&p)
    };
    let near_switch = |x: f64| x.abs() < SHAPE_EPS;

    if !near_switch(xi) && (near_switch(xi + SHAPE_STEP) || near_switch(xi - SHAPE_STEP)) {
        let h = SHAPE_STEP.copysign(xi);
        (at(xi + h) - at(xi)) / h
    } else {
        (at(xi + SHAPE_STEP) - at(xi - SHAPE_STEP)) / (2.0 * SHAPE_STEP)
    }
}

/// Return levels at `periods` (years) with two-sided intervals at
/// `confidence_level`.
///
/// The insufficient-data sentinel propagates as one null row per period,
/// labelled with the original reason.
pub fn return_levels(fit: &ExtremeFit, periods: &[f64], confidence_level: f64) -> Result<Vec<ReturnLevelEstimate>, AnalysisError> {
    validate(periods, confidence_level)?;

    Ok(match fit {
        ExtremeFit::InsufficientData { reason, .. } => periods
            .iter()
            .map(|&p| ReturnLevelEstimate::null(p, reason.clone()))
            .collect(),
        ExtremeFit::Fitted(dist) => {
            let z = normal_critical_value(confidence_level);
            periods.iter().map(|&p| estimate(dist, p, z)).collect()
        }
    })
}

/// `points` periods log-spaced from 1.1 to `max_period` inclusive.
pub fn log_spaced_periods(max_period: f64, points: usize) -> Vec<f64> {
    match points {
        0 => Vec::new(),
        1 => vec![max_period],
        _ => {
            let (lo, hi) = (CURVE_MIN_PERIOD.ln(), max_period.ln());
            (0..points)
                .map(|i| (lo + (hi - lo) * i as f64 / (points - 1) as f64).exp())
                .collect()
        }
    }
}

/// Return-level curve for plotting, on log-spaced periods.
pub fn return_level_curve(
    fit: &ExtremeFit,
    max_period: f64,
    points: usize,
    confidence_level: f64,
) -> Result<Vec<ReturnLevelEstimate>, AnalysisError> {
    if !(max_period > CURVE_MIN_PERIOD) || points < 2 {
        return Err(AnalysisError::InvalidConfiguration(format!(
            "return-level curve needs max period above {} and at least 2 points",
            CURVE_MIN_PERIOD
        )));
    }
    return_levels(fit, &log_spaced_periods(max_period, points), confidence_level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::extremes::{fit_gev, fit_gpd, AnnualMaximaSeries};
    use crate::model::Variable;

    fn gumbel_fit() -> ExtremeFit {
        let data: Vec<f64> = (1..=10)
            .map(|i| 20.0 - 3.0 * (-((i as f64 - 0.5) / 10.0).ln()).ln())
            .collect();
        ExtremeFit::from(fit_gev(&data).unwrap())
    }

    #[test]
    fn test_intervals_bracket_point_estimate() {
        let rows = return_levels(&gumbel_fit(), &[2.0, 10.0, 100.0], 0.95).unwrap();
        assert_eq!(rows.len(), 3);
        for row in &rows {
            let point = row.point_estimate.unwrap();
            assert!(row.lower_ci.unwrap() < point && point < row.upper_ci.unwrap());
            assert!(row.note.is_none());
        }
        // Intervals widen with the period
        let width = |r: &ReturnLevelEstimate| r.upper_ci.unwrap() - r.lower_ci.unwrap();
        assert!(width(&rows[2]) > width(&rows[0]));
    }

    fn exponential_tail(shape: f64) -> FittedDistribution {
        FittedDistribution {
            family: crate::analysis::extremes::Family::Gpd,
            location: None,
            scale: 1.0,
            shape,
            standard_errors: crate::analysis::extremes::StandardErrors { location: None, scale: None, shape: None },
            covariance: Some(vec![vec![0.01, 0.0], vec![0.0, 0.01]]),
            n_input_points: 100,
            threshold: Some(2.0),
            exceedance_rate: Some(10.0),
            log_likelihood: 0.0,
            aic: 0.0,
            annual_maxima: None,
        }
    }

    #[test]
    fn test_interval_width_is_smooth_through_shape_switch() {
        let half_width = |shape: f64| {
            let row = &return_levels(&ExtremeFit::Fitted(exponential_tail(shape)), &[100.0], 0.95).unwrap()[0];
            row.upper_ci.unwrap() - row.point_estimate.unwrap()
        };
        // m = 1000 exceedances per period: dz/dσ = ln m, dz/dξ = σ (ln m)² / 2 at ξ = 0
        let ln_m = 1000.0_f64.ln();
        let expected = normal_critical_value(0.95) * (0.01 * (ln_m.powi(2) + ln_m.powi(4) / 4.0)).sqrt();

        for shape in [0.0, 5e-7, 1.5e-6, -1.5e-6, SHAPE_STEP + 5e-7] {
            let width = half_width(shape);
            assert!((width - expected).abs() / expected < 1e-2, "shape {}: {} vs {}", shape, width, expected);
        }
    }

    #[test]
    fn test_sentinel_propagates_null_rows() {
        let sentinel = ExtremeFit::InsufficientData {
            reason: "insufficient data for GEV annual maxima of wave_height: need at least 5, got 3".into(),
            annual_maxima: AnnualMaximaSeries { variable: Variable::WaveHeight, maxima: vec![] },
        };
        let rows = return_levels(&sentinel, &[10.0, 50.0], 0.95).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.point_estimate.is_none() && r.lower_ci.is_none()));
        assert!(rows[0].note.as_deref().unwrap().contains("got 3"));
        assert_eq!(rows[1].return_period, 50.0);
    }

    #[test]
    fn test_gpd_without_rate_reports_null_levels() {
        let values: Vec<f64> = (1..=60).map(|i| 1.0 - (1.0 - (i as f64 - 0.5) / 60.0).ln()).collect();
        let fit = ExtremeFit::from(fit_gpd(&values, 1.0, 30).unwrap());
        let rows = return_levels(&fit, &[10.0], 0.95).unwrap();
        assert_eq!(rows[0].point_estimate, None);
        assert_eq!(rows[0].note.as_deref(), Some("exceedance rate unknown"));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(matches!(
            return_levels(&gumbel_fit(), &[1.0], 0.95),
            Err(AnalysisError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            return_levels(&gumbel_fit(), &[10.0], 1.5),
            Err(AnalysisError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_curve_is_log_spaced() {
        let periods = log_spaced_periods(200.0, 50);
        assert_eq!(periods.len(), 50);
        assert!((periods[0] - 1.1).abs() < 1e-12);
        assert!((periods[49] - 200.0).abs() < 1e-9);
        let r1 = periods[1] / periods[0];
        let r2 = periods[2] / periods[1];
        assert!((r1 - r2).abs() < 1e-9);

        let curve = return_level_curve(&gumbel_fit(), 200.0, 50, 0.95).unwrap();
        assert_eq!(curve.len(), 50);
    }
}
