//! Statistical utility functions.
//!
//! Callers pass valid values only (nulls and non-finite values already
//! filtered out); every function here is total over that input and signals
//! "not computable" with `None` or NaN rather than panicking.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Mean of a slice. NaN when empty.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n-1 denominator). NaN for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Sorted copy, ascending.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Linear-interpolated quantile of an ascending slice (the "type 7"
/// definition used by most numeric libraries). NaN when empty.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return f64::NAN;
    }
    if n == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn quantile(values: &[f64], q: f64) -> f64 {
    quantile_sorted(&sorted(values), q)
}

pub fn median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Two-sided standard-normal critical value for a confidence level,
/// e.g. 0.95 -> 1.96.
pub fn normal_critical_value(confidence_level: f64) -> f64 {
    let p = 0.5 + confidence_level / 2.0;
    Normal::new(0.0, 1.0)
        .map(|n| n.inverse_cdf(p))
        .unwrap_or(f64::NAN)
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Distributional summary of a set of values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Summary {
    /// `None` when there are no values.
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let s = sorted(values);
        Some(Self {
            n: s.len(),
            mean: mean(&s),
            median: quantile_sorted(&s, 0.5),
            std_dev: std_dev(&s),
            min: s[0],
            max: s[s.len() - 1],
            p90: quantile_sorted(&s, 0.90),
            p95: quantile_sorted(&s, 0.95),
            p99: quantile_sorted(&s, 0.99),
        })
    }
}

// ---------------------------------------------------------------------------
// Simple linear regression
// ---------------------------------------------------------------------------

/// Ordinary least squares fit of y = intercept + slope * x.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// Two-sided p-value of the slope (Student's t, n-2 df).
    pub p_value: f64,
    pub n: usize,
}

/// `None` for fewer than three points or when x has no spread.
pub fn linear_regression(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let n = x.len();
    if n != y.len() || n < 3 {
        return None;
    }
    let mx = mean(x);
    let my = mean(y);
    let sxx: f64 = x.iter().map(|v| (v - mx).powi(2)).sum();
    if sxx <= 0.0 {
        return None;
    }
    let sxy: f64 = x.iter().zip(y).map(|(a, b)| (a - mx) * (b - my)).sum();
    let syy: f64 = y.iter().map(|v| (v - my).powi(2)).sum();

    let slope = sxy / sxx;
    let intercept = my - slope * mx;
    let sse: f64 = x
        .iter()
        .zip(y)
        .map(|(a, b)| (b - intercept - slope * a).powi(2))
        .sum();
    let r_squared = if syy > 0.0 { 1.0 - sse / syy } else { 1.0 };

    let df = (n - 2) as f64;
    let se_slope = (sse / df / sxx).sqrt();
    let p_value = if se_slope > 0.0 {
        let t = (slope / se_slope).abs();
        StudentsT::new(0.0, 1.0, df)
            .map(|dist| 2.0 * (1.0 - dist.cdf(t)))
            .unwrap_or(f64::NAN)
    } else if slope != 0.0 {
        0.0
    } else {
        1.0
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
        p_value,
        n,
    })
}

// ---------------------------------------------------------------------------
// Dense linear algebra
// ---------------------------------------------------------------------------

/// Inverse of a small square matrix by Gauss-Jordan elimination with
/// partial pivoting. `None` when the matrix is singular.
pub fn invert_matrix(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    if a.iter().any(|row| row.len() != n) {
        return None;
    }
    let mut aug: Vec<Vec<f64>> = a
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut r = row.clone();
            r.extend((0..n).map(|j| if i == j { 1.0 } else { 0.0 }));
            r
        })
        .collect();

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| aug[i][col].abs().total_cmp(&aug[j][col].abs()))?;
        if aug[pivot][col].abs() < 1e-12 || !aug[pivot][col].is_finite() {
            return None;
        }
        aug.swap(col, pivot);

        let p = aug[col][col];
        for v in aug[col].iter_mut() {
            *v /= p;
        }
        for row in 0..n {
            if row != col {
                let factor = aug[row][col];
                if factor != 0.0 {
                    for k in 0..2 * n {
                        aug[row][k] -= factor * aug[col][k];
                    }
                }
            }
        }
    }

    Some(aug.into_iter().map(|r| r[n..].to_vec()).collect())
}
