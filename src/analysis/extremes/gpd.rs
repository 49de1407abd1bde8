/// Peaks over threshold: GPD fit to (declustered) threshold exceedances.

use serde::Serialize;

use super::decluster::{decluster, exceedances};
use super::{aic, observed_covariance, standard_error, Family, FittedDistribution, StandardErrors, SHAPE_EPS};
use crate::analysis::groupings::{valid_points, years_spanned};
use crate::config::ExtremesConfig;
use crate::model::{AnalysisError, Observation, Variable};
use crate::optimize::{minimize, PENALTY};
use crate::stats;

/// GPD negative log-likelihood of excesses y = x − u at θ = (ln σ, ξ).
pub fn gpd_neg_log_likelihood(excess: &[f64], theta: &[f64]) -> f64 {
    let (log_sigma, xi) = (theta[0], theta[1]);
    let sigma = log_sigma.exp();
    let mut total = excess.len() as f64 * log_sigma;

    if xi.abs() < SHAPE_EPS {
        return total + excess.iter().map(|y| y / sigma).sum::<f64>();
    }

    for &y in excess {
        let t = 1.0 + xi * y / sigma;
        if t <= 0.0 {
            return PENALTY;
        }
        total += (1.0 + 1.0 / xi) * t.ln();
    }
    total
}

fn natural_neg_log_likelihood(excess: &[f64], params: &[f64]) -> f64 {
    if params[0] <= 0.0 {
        return PENALTY;
    }
    gpd_neg_log_likelihood(excess, &[params[0].ln(), params[1]])
}

/// Level exceeded on average once every `period` years given `rate`
/// exceedances of `threshold` per year.
pub fn gpd_return_level(threshold: f64, sigma: f64, xi: f64, rate: f64, period: f64) -> f64 {
    let m = rate * period;
    if xi.abs() < SHAPE_EPS {
        threshold + sigma * m.ln()
    } else {
        threshold + sigma / xi * (m.powf(xi) - 1.0)
    }
}

/// Maximum-likelihood GPD fit to values above `threshold`.
///
/// Values at or below the threshold are ignored. Fewer than
/// `min_exceedances` remaining values is a hard `InsufficientExceedances`
/// failure. The result carries no exceedance rate; attach one with
/// [`FittedDistribution::with_exceedance_rate`] to get return levels in
/// years.
pub fn fit_gpd(values: &[f64], threshold: f64, min_exceedances: usize) -> Result<FittedDistribution, AnalysisError> {
    if !threshold.is_finite() {
        return Err(AnalysisError::InvalidConfiguration(format!("GPD threshold must be finite, got {}", threshold)));
    }
    let excess: Vec<f64> = values.iter().filter(|v| **v > threshold).map(|v| v - threshold).collect();

    let needed = min_exceedances.max(2);
    if excess.len() < needed {
        return Err(AnalysisError::InsufficientExceedances {
            needed,
            got: excess.len(),
            threshold,
        });
    }

    // Method-of-moments scale as the start value
    let m = stats::mean(&excess);
    let v = stats::variance(&excess);
    let sigma0 = if v > 0.0 { 0.5 * m * (m * m / v + 1.0) } else { m };
    let start = [sigma0.max(1e-6).ln(), 0.1];

    let result = minimize(|theta| gpd_neg_log_likelihood(&excess, theta), &start);
    let nll = result.optimal_value;
    if !nll.is_finite() || nll >= PENALTY {
        return Err(AnalysisError::FitFailed(format!("GPD likelihood did not converge (nll = {})", nll)));
    }

    let sigma = result.optimal_point[0].exp();
    let xi = result.optimal_point[1];
    if !(sigma.is_finite() && sigma > 0.0 && xi.is_finite()) {
        return Err(AnalysisError::FitFailed("GPD optimum is not finite".to_string()));
    }

    let covariance = observed_covariance(|p| natural_neg_log_likelihood(&excess, p), &[sigma, xi]);

    log::debug!(
        "GPD fit on {} exceedances of {:.3}: sigma={:.3} xi={:.3}",
        excess.len(),
        threshold,
        sigma,
        xi
    );

    Ok(FittedDistribution {
        family: Family::Gpd,
        location: None,
        scale: sigma,
        shape: xi,
        standard_errors: StandardErrors {
            location: None,
            scale: standard_error(&covariance, 0),
            shape: standard_error(&covariance, 1),
        },
        covariance,
        n_input_points: excess.len(),
        threshold: Some(threshold),
        exceedance_rate: None,
        log_likelihood: -nll,
        aic: aic(2, -nll),
        annual_maxima: None,
    })
}

/// Peaks-over-threshold fit of `variable`.
///
/// The threshold defaults to the configured quantile of the valid values.
/// Exceedances are declustered when configured; the exceedance rate is the
/// number of retained exceedances per year spanned by the valid series.
pub fn fit_peaks_over_threshold(
    observations: &[Observation],
    variable: Variable,
    threshold: Option<f64>,
    config: &ExtremesConfig,
) -> Result<FittedDistribution, AnalysisError> {
    let points = valid_points(observations, variable);
    let threshold = match threshold {
        Some(u) => u,
        None if points.is_empty() => {
            return Err(AnalysisError::InsufficientExceedances {
                needed: config.min_exceedances,
                got: 0,
                threshold: f64::NAN,
            });
        }
        None => {
            let values: Vec<f64> = points.iter().map(|(_, v)| *v).collect();
            stats::quantile(&values, config.threshold_quantile)
        }
    };

    let raw = exceedances(&points, threshold);
    let selected = if config.decluster {
        decluster(&raw, config.decluster_hours)
    } else {
        raw.clone()
    };
    log::debug!(
        "{}: {} exceedances of {:.3}, {} after declustering",
        variable,
        raw.len(),
        threshold,
        selected.len()
    );

    let values: Vec<f64> = selected.iter().map(|e| e.value).collect();
    let fit = fit_gpd(&values, threshold, config.min_exceedances)?;

    let years = years_spanned(&points);
    Ok(if years > 0.0 {
        fit.with_exceedance_rate(selected.len() as f64 / years)
    } else {
        fit
    })
}

// ---------------------------------------------------------------------------
// Threshold selection aid
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeanResidualLife {
    pub threshold: f64,
    pub mean_excess: f64,
    pub n_exceedances: usize,
}

/// Mean excess over candidate thresholds evenly spaced between two
/// quantiles of `values`. Above a suitable GPD threshold the curve is
/// roughly linear in u. Thresholds with no exceedances are skipped.
pub fn mean_residual_life(values: &[f64], lower_quantile: f64, upper_quantile: f64, points: usize) -> Vec<MeanResidualLife> {
    if values.is_empty() || points == 0 {
        return Vec::new();
    }
    let sorted = stats::sorted(values);
    let lo = stats::quantile_sorted(&sorted, lower_quantile);
    let hi = stats::quantile_sorted(&sorted, upper_quantile);
    let step = if points > 1 { (hi - lo) / (points - 1) as f64 } else { 0.0 };

    (0..points)
        .filter_map(|i| {
            let u = lo + step * i as f64;
            let excess: Vec<f64> = sorted.iter().filter(|v| **v > u).map(|v| v - u).collect();
            if excess.is_empty() {
                return None;
            }
            Some(MeanResidualLife {
                threshold: u,
                mean_excess: stats::mean(&excess),
                n_exceedances: excess.len(),
            })
        })
        .collect()
}
