//! Derivative-free minimization for the maximum-likelihood fits.
//!
//! The likelihood surfaces of the GEV and GPD have hard support boundaries
//! (the objective is "infinite" outside them), which rules out plain
//! gradient methods; the Nelder-Mead simplex handles that naturally.

/// Objective value standing in for "outside the support".
pub const PENALTY: f64 = 1e10;

#[derive(Debug, Clone)]
pub struct NelderMeadResult {
    pub optimal_point: Vec<f64>,
    pub optimal_value: f64,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct NelderMeadConfig {
    pub max_iter: usize,
    /// Convergence tolerance on the spread of simplex values.
    pub tolerance: f64,
    pub alpha: f64, // reflection
    pub gamma: f64, // expansion
    pub rho: f64,   // contraction
    pub sigma: f64, // shrink
    /// Relative size of the initial simplex.
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iter: 2000,
            tolerance: 1e-10,
            alpha: 1.0,
            gamma: 2.0,
            rho: 0.5,
            sigma: 0.5,
            initial_step: 0.1,
        }
    }
}

/// Nelder-Mead simplex minimization of `objective` from `initial`.
pub fn nelder_mead<F>(objective: F, initial: &[f64], config: &NelderMeadConfig) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let n = initial.len();
    if n == 0 {
        return NelderMeadResult {
            optimal_point: vec![],
            optimal_value: f64::NAN,
            iterations: 0,
            converged: false,
        };
    }

    // Non-finite objective values are treated as the penalty so the simplex
    // ordering stays total.
    let eval = |x: &[f64]| {
        let v = objective(x);
        if v.is_finite() { v } else { PENALTY }
    };

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(initial.to_vec());
    for i in 0..n {
        let mut vertex = initial.to_vec();
        vertex[i] += if initial[i].abs() > 1e-10 {
            config.initial_step * initial[i].abs()
        } else {
            config.initial_step
        };
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        let best = order[0];
        let worst = order[n];
        let second_worst = order[n - 1];

        if (values[worst] - values[best]).abs() < config.tolerance {
            converged = true;
            break;
        }

        let centroid = centroid_excluding(&simplex, worst);

        let reflected = towards(&centroid, &simplex[worst], -config.alpha);
        let reflected_value = eval(&reflected);

        if reflected_value >= values[best] && reflected_value < values[second_worst] {
            simplex[worst] = reflected;
            values[worst] = reflected_value;
            continue;
        }

        if reflected_value < values[best] {
            let expanded = towards(&centroid, &reflected, config.gamma);
            let expanded_value = eval(&expanded);
            if expanded_value < reflected_value {
                simplex[worst] = expanded;
                values[worst] = expanded_value;
            } else {
                simplex[worst] = reflected;
                values[worst] = reflected_value;
            }
            continue;
        }

        if reflected_value < values[worst] {
            // Outside contraction
            let contracted = towards(&centroid, &reflected, config.rho);
            let contracted_value = eval(&contracted);
            if contracted_value <= reflected_value {
                simplex[worst] = contracted;
                values[worst] = contracted_value;
                continue;
            }
        } else {
            // Inside contraction
            let contracted = towards(&centroid, &simplex[worst], config.rho);
            let contracted_value = eval(&contracted);
            if contracted_value < values[worst] {
                simplex[worst] = contracted;
                values[worst] = contracted_value;
                continue;
            }
        }

        // Shrink towards the best vertex
        let anchor = simplex[best].clone();
        for i in 0..=n {
            if i != best {
                for j in 0..n {
                    simplex[i][j] = anchor[j] + config.sigma * (simplex[i][j] - anchor[j]);
                }
                values[i] = eval(&simplex[i]);
            }
        }
    }

    let best = (0..=n)
        .min_by(|&a, &b| values[a].total_cmp(&values[b]))
        .unwrap_or(0);

    NelderMeadResult {
        optimal_point: simplex[best].clone(),
        optimal_value: values[best],
        iterations,
        converged,
    }
}

/// Runs Nelder-Mead, then restarts once from the first optimum with a
/// fresh simplex. The restart recovers from premature collapse of the
/// simplex along a narrow likelihood ridge.
pub fn minimize<F>(objective: F, initial: &[f64]) -> NelderMeadResult
where
    F: Fn(&[f64]) -> f64,
{
    let config = NelderMeadConfig::default();
    let first = nelder_mead(&objective, initial, &config);
    let second = nelder_mead(&objective, &first.optimal_point, &config);
    if second.optimal_value <= first.optimal_value {
        NelderMeadResult {
            iterations: first.iterations + second.iterations,
            ..second
        }
    } else {
        first
    }
}

/// Central-difference Hessian of `f` at `x`.
pub fn numerical_hessian<F>(f: F, x: &[f64]) -> Vec<Vec<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    let n = x.len();
    let h: Vec<f64> = x.iter().map(|v| 1e-4 * v.abs().max(1.0)).collect();
    let f0 = f(x);
    let mut hess = vec![vec![0.0; n]; n];

    let shifted = |moves: &[(usize, f64)]| {
        let mut p = x.to_vec();
        for &(i, d) in moves {
            p[i] += d;
        }
        f(&p)
    };

    for i in 0..n {
        let fp = shifted(&[(i, h[i])]);
        let fm = shifted(&[(i, -h[i])]);
        hess[i][i] = (fp - 2.0 * f0 + fm) / (h[i] * h[i]);

        for j in (i + 1)..n {
            let fpp = shifted(&[(i, h[i]), (j, h[j])]);
            let fpm = shifted(&[(i, h[i]), (j, -h[j])]);
            let fmp = shifted(&[(i, -h[i]), (j, h[j])]);
            let fmm = shifted(&[(i, -h[i]), (j, -h[j])]);
            let v = (fpp - fpm - fmp + fmm) / (4.0 * h[i] * h[j]);
            hess[i][j] = v;
            hess[j][i] = v;
        }
    }

    hess
}

/// Central-difference gradient of `f` at `x`.
pub fn numerical_gradient<F>(f: F, x: &[f64]) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    (0..x.len())
        .map(|i| {
            let h = 1e-6 * x[i].abs().max(1.0);
            let mut up = x.to_vec();
            let mut down = x.to_vec();
            up[i] += h;
            down[i] -= h;
            (f(&up) - f(&down)) / (2.0 * h)
        })
        .collect()
}

fn centroid_excluding(simplex: &[Vec<f64>], exclude: usize) -> Vec<f64> {
    let n = simplex[0].len();
    let count = (simplex.len() - 1) as f64;
    let mut centroid = vec![0.0; n];
    for (i, vertex) in simplex.iter().enumerate() {
        if i != exclude {
            for j in 0..n {
                centroid[j] += vertex[j];
            }
        }
    }
    centroid.iter_mut().for_each(|c| *c /= count);
    centroid
}

/// `centroid + t * (point - centroid)`; t = -alpha reflects.
fn towards(centroid: &[f64], point: &[f64], t: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(point)
        .map(|(c, p)| c + t * (p - c))
        .collect()
}
