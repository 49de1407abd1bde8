//! Extreme value engine.
//!
//! Two estimation modes produce a [`FittedDistribution`]:
//! - `gev` — block maxima: annual maxima fitted with a Generalized Extreme
//!   Value distribution. Too few years is *recoverable*: the result is the
//!   [`ExtremeFit::InsufficientData`] sentinel carrying the partial maxima.
//! - `gpd` — peaks over threshold: (declustered) exceedances fitted with a
//!   Generalized Pareto distribution. Too few exceedances is *fatal*: the
//!   call returns `AnalysisError::InsufficientExceedances`.
//!
//! `return_levels` turns either fit into return levels with delta-method
//! confidence intervals. Both likelihoods are maximized with Nelder-Mead
//! over (log scale, shape), and parameter covariances come from the
//! observed information in the natural parameters.

pub mod decluster;
pub mod gev;
pub mod gpd;
pub mod return_levels;

use serde::Serialize;

pub use decluster::{decluster, exceedances, Exceedance};
pub use gev::{annual_maxima, fit_block_maxima, fit_gev, AnnualMaximaSeries, AnnualMaximum};
pub use gpd::{fit_gpd, fit_peaks_over_threshold, mean_residual_life, MeanResidualLife};
pub use return_levels::{return_level_curve, return_levels, ReturnLevelEstimate};

use crate::optimize::numerical_hessian;
use crate::stats::invert_matrix;

/// |ξ| below which the Gumbel / exponential limit formulas are used.
pub(crate) const SHAPE_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Family {
    #[serde(rename = "GEV")]
    Gev,
    #[serde(rename = "GPD")]
    Gpd,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardErrors {
    pub location: Option<f64>,
    pub scale: Option<f64>,
    pub shape: Option<f64>,
}

/// Maximum-likelihood fit of a GEV or GPD. Immutable once fitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FittedDistribution {
    pub family: Family,
    /// GEV only.
    pub location: Option<f64>,
    pub scale: f64,
    /// ξ > 0 heavy tail, ξ < 0 bounded tail, ξ = 0 Gumbel/exponential.
    pub shape: f64,
    pub standard_errors: StandardErrors,
    /// Covariance of the natural parameters: (location, scale, shape) for
    /// GEV, (scale, shape) for GPD. `None` when the observed information is
    /// singular.
    pub covariance: Option<Vec<Vec<f64>>>,
    pub n_input_points: usize,
    /// GPD only.
    pub threshold: Option<f64>,
    /// GPD only: exceedances per year.
    pub exceedance_rate: Option<f64>,
    pub log_likelihood: f64,
    pub aic: f64,
    /// GEV only: the annual maxima the fit used.
    pub annual_maxima: Option<AnnualMaximaSeries>,
}

impl FittedDistribution {
    /// Natural parameter vector in covariance order.
    pub fn parameters(&self) -> Vec<f64> {
        match self.family {
            Family::Gev => vec![self.location.unwrap_or(f64::NAN), self.scale, self.shape],
            Family::Gpd => vec![self.scale, self.shape],
        }
    }

    /// Level exceeded on average once every `period` years, for this fit's
    /// parameters.
    pub fn return_level(&self, period: f64) -> Option<f64> {
        self.return_level_with(&self.parameters(), period)
    }

    /// Same as [`return_level`](Self::return_level) for an arbitrary natural
    /// parameter vector (used by the delta method).
    pub(crate) fn return_level_with(&self, params: &[f64], period: f64) -> Option<f64> {
        let level = match self.family {
            Family::Gev => gev::gev_return_level(params[0], params[1], params[2], period),
            Family::Gpd => {
                let rate = self.exceedance_rate?;
                gpd::gpd_return_level(self.threshold?, params[0], params[1], rate, period)
            }
        };
        level.is_finite().then_some(level)
    }

    pub fn with_exceedance_rate(mut self, rate: f64) -> Self {
        self.exceedance_rate = Some(rate);
        self
    }
}

/// Outcome of a block-maxima fit (or a wrapped POT fit).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtremeFit {
    Fitted(FittedDistribution),
    /// Recoverable: too little data to fit, raw maxima still reported.
    InsufficientData {
        reason: String,
        annual_maxima: AnnualMaximaSeries,
    },
}

impl ExtremeFit {
    pub fn distribution(&self) -> Option<&FittedDistribution> {
        match self {
            ExtremeFit::Fitted(d) => Some(d),
            ExtremeFit::InsufficientData { .. } => None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.distribution().is_some()
    }

    /// Annual maxima behind the result, when it came from block maxima.
    pub fn annual_maxima(&self) -> Option<&AnnualMaximaSeries> {
        match self {
            ExtremeFit::Fitted(d) => d.annual_maxima.as_ref(),
            ExtremeFit::InsufficientData { annual_maxima, .. } => Some(annual_maxima),
        }
    }
}

impl From<FittedDistribution> for ExtremeFit {
    fn from(distribution: FittedDistribution) -> Self {
        ExtremeFit::Fitted(distribution)
    }
}

/// Inverse of the observed information (Hessian of the negative
/// log-likelihood) at `params`. `None` unless every variance is positive
/// and finite.
pub(crate) fn observed_covariance<F>(neg_log_likelihood: F, params: &[f64]) -> Option<Vec<Vec<f64>>>
where
    F: Fn(&[f64]) -> f64,
{
    let hessian = numerical_hessian(neg_log_likelihood, params);
    let cov = invert_matrix(&hessian)?;
    let valid = cov
        .iter()
        .enumerate()
        .all(|(i, row)| row.iter().all(|v| v.is_finite()) && row[i] > 0.0);
    valid.then_some(cov)
}

pub(crate) fn standard_error(cov: &Option<Vec<Vec<f64>>>, i: usize) -> Option<f64> {
    cov.as_ref().map(|c| c[i][i].sqrt())
}

/// Akaike information criterion, 2k − 2 logL.
pub(crate) fn aic(n_params: usize, log_likelihood: f64) -> f64 {
    2.0 * n_params as f64 - 2.0 * log_likelihood
}
