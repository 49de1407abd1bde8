/// Block maxima: annual maxima and the GEV fit.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use super::{aic, observed_covariance, standard_error, ExtremeFit, Family, FittedDistribution, StandardErrors, SHAPE_EPS};
use crate::config::ExtremesConfig;
use crate::model::{AnalysisError, Observation, Variable};
use crate::optimize::{minimize, PENALTY};
use crate::stats;

/// Euler-Mascheroni constant, used for the Gumbel moment start values.
const EULER_GAMMA: f64 = 0.5772;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualMaximum {
    pub year: i32,
    pub value: f64,
    /// When the maximum was observed (first occurrence on ties).
    pub time: DateTime<Utc>,
}

/// One maximum per calendar year holding at least one valid value, years
/// strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualMaximaSeries {
    pub variable: Variable,
    pub maxima: Vec<AnnualMaximum>,
}

impl AnnualMaximaSeries {
    pub fn values(&self) -> Vec<f64> {
        self.maxima.iter().map(|m| m.value).collect()
    }

    pub fn len(&self) -> usize {
        self.maxima.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maxima.is_empty()
    }
}

pub fn annual_maxima(observations: &[Observation], variable: Variable) -> AnnualMaximaSeries {
    let mut by_year: BTreeMap<i32, AnnualMaximum> = BTreeMap::new();
    for obs in observations {
        let Some(value) = obs.value(variable) else { continue };
        let year = obs.time.year();
        let candidate = AnnualMaximum { year, value, time: obs.time };
        by_year
            .entry(year)
            .and_modify(|current| {
                if value > current.value || (value == current.value && obs.time < current.time) {
                    *current = candidate.clone();
                }
            })
            .or_insert(candidate);
    }
    AnnualMaximaSeries {
        variable,
        maxima: by_year.into_values().collect(),
    }
}

// ---------------------------------------------------------------------------
// Likelihood
// ---------------------------------------------------------------------------

/// GEV negative log-likelihood at θ = (μ, ln σ, ξ).
pub fn gev_neg_log_likelihood(data: &[f64], theta: &[f64]) -> f64 {
    let (mu, log_sigma, xi) = (theta[0], theta[1], theta[2]);
    let sigma = log_sigma.exp();
    let mut total = data.len() as f64 * log_sigma;

    if xi.abs() < SHAPE_EPS {
        for &x in data {
            let z = (x - mu) / sigma;
            total += z + (-z).exp();
        }
        return total;
    }

    for &x in data {
        let t = 1.0 + xi * (x - mu) / sigma;
        if t <= 0.0 {
            return PENALTY;
        }
        let log_t = t.ln();
        total += (1.0 + 1.0 / xi) * log_t + (-log_t / xi).exp();
    }
    total
}

/// Same likelihood in the natural parameters (μ, σ, ξ).
fn natural_neg_log_likelihood(data: &[f64], params: &[f64]) -> f64 {
    if params[1] <= 0.0 {
        return PENALTY;
    }
    gev_neg_log_likelihood(data, &[params[0], params[1].ln(), params[2]])
}

/// Return level for a T-year period: the 1 − 1/T quantile.
pub fn gev_return_level(mu: f64, sigma: f64, xi: f64, period: f64) -> f64 {
    let y = -(1.0 - 1.0 / period).ln();
    if xi.abs() < SHAPE_EPS {
        mu - sigma * y.ln()
    } else {
        mu - sigma / xi * (1.0 - y.powf(-xi))
    }
}

// ---------------------------------------------------------------------------
// Fitting
// ---------------------------------------------------------------------------

/// Maximum-likelihood GEV fit to a set of block maxima.
pub fn fit_gev(maxima: &[f64]) -> Result<FittedDistribution, AnalysisError> {
    if maxima.len() < 3 {
        return Err(AnalysisError::insufficient("GEV fit", 3, maxima.len()));
    }
    let sd = stats::std_dev(maxima);
    if !(sd > 0.0) {
        return Err(AnalysisError::FitFailed("block maxima have no spread".to_string()));
    }

    let sigma0 = 6f64.sqrt() * sd / std::f64::consts::PI;
    let mu0 = stats::mean(maxima) - EULER_GAMMA * sigma0;
    let start = [mu0, sigma0.ln(), 0.1];

    let result = minimize(|theta| gev_neg_log_likelihood(maxima, theta), &start);
    let nll = result.optimal_value;
    if !nll.is_finite() || nll >= PENALTY {
        return Err(AnalysisError::FitFailed(format!("GEV likelihood did not converge (nll = {})", nll)));
    }

    let mu = result.optimal_point[0];
    let sigma = result.optimal_point[1].exp();
    let xi = result.optimal_point[2];
    if !(mu.is_finite() && sigma.is_finite() && sigma > 0.0 && xi.is_finite()) {
        return Err(AnalysisError::FitFailed("GEV optimum is not finite".to_string()));
    }

    let params = [mu, sigma, xi];
    let covariance = observed_covariance(|p| natural_neg_log_likelihood(maxima, p), &params);

    log::debug!(
        "GEV fit on {} maxima: mu={:.3} sigma={:.3} xi={:.3} ({} iterations)",
        maxima.len(),
        mu,
        sigma,
        xi,
        result.iterations
    );

    Ok(FittedDistribution {
        family: Family::Gev,
        location: Some(mu),
        scale: sigma,
        shape: xi,
        standard_errors: StandardErrors {
            location: standard_error(&covariance, 0),
            scale: standard_error(&covariance, 1),
            shape: standard_error(&covariance, 2),
        },
        covariance,
        n_input_points: maxima.len(),
        threshold: None,
        exceedance_rate: None,
        log_likelihood: -nll,
        aic: aic(3, -nll),
        annual_maxima: None,
    })
}

/// Annual maxima of `variable` fitted with a GEV.
///
/// Fewer than `config.min_years` maxima, or maxima with no spread, yield the
/// recoverable [`ExtremeFit::InsufficientData`] sentinel with the raw maxima.
pub fn fit_block_maxima(
    observations: &[Observation],
    variable: Variable,
    config: &ExtremesConfig,
) -> Result<ExtremeFit, AnalysisError> {
    let series = annual_maxima(observations, variable);
    let needed = config.min_years.max(3);

    if series.len() < needed {
        let reason = AnalysisError::insufficient(format!("GEV annual maxima of {}", variable), needed, series.len());
        log::debug!("{}", reason);
        return Ok(ExtremeFit::InsufficientData {
            reason: reason.to_string(),
            annual_maxima: series,
        });
    }

    let values = series.values();
    if !(stats::std_dev(&values) > 0.0) {
        return Ok(ExtremeFit::InsufficientData {
            reason: format!("GEV annual maxima of {}: all {} maxima are equal", variable, values.len()),
            annual_maxima: series,
        });
    }

    let mut fit = fit_gev(&values)?;
    fit.annual_maxima = Some(series);
    Ok(ExtremeFit::Fitted(fit))
}
