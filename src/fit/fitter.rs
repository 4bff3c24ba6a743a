//! Bounded nonlinear least squares for a single directional model.
//!
//! Given:
//! - positions `x_i`, distance proxies `d_i`, residuals `y_i`
//! - optional weights `w_i` (e.g. `1 / σ_i`)
//! - a starting guess and a box `[lower, upper]`
//!
//! we minimize
//!
//! ```text
//! cost(p) = ½ Σ ( w_i · (predict(p; x_i, d_i) − y_i) )²
//! ```
//!
//! with a projected Levenberg–Marquardt iteration:
//! - analytic Jacobian from `models::fill_gradient`
//! - parameters pinned at a bound whose gradient points outward are frozen
//!   for the step (active set), the rest take a damped Gauss–Newton step
//! - the trial point is projected back into the box, so returned parameters
//!   never violate the bounds
//!
//! Convergence follows the usual `ftol` / `xtol` / `gtol` tests. Exhausting the
//! iteration budget (or the optional wall-clock timeout) is an error, never a
//! silently returned "best so far".

use std::time::{Duration, Instant};

use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace};

use crate::domain::{FitResult, ModelParameters, ModelVariant, ParamBounds, SkyPosition};
use crate::error::EngineError;
use crate::math::solve_least_squares;
use crate::models::{fill_gradient, predict, validate_inputs};

/// Largest damping factor tried before giving up on a step.
const MAX_DAMPING: f64 = 1e16;

/// Solver knobs.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Maximum number of accepted-or-rejected outer iterations.
    pub max_iterations: usize,
    /// Relative cost-reduction tolerance.
    pub ftol: f64,
    /// Relative step-size tolerance.
    pub xtol: f64,
    /// Projected-gradient infinity-norm tolerance.
    pub gtol: f64,
    /// Initial Levenberg–Marquardt damping.
    pub initial_damping: f64,
    /// Optional wall-clock budget for one fit call.
    pub timeout: Option<Duration>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            initial_damping: 1e-3,
            timeout: None,
        }
    }
}

/// The data a model is fitted against. Positions and distances stay fixed
/// across permutation trials; only `residuals` changes.
#[derive(Debug, Clone, Copy)]
pub struct FitData<'a> {
    pub positions: &'a [SkyPosition],
    pub distances: &'a [f64],
    pub residuals: &'a [f64],
}

impl<'a> FitData<'a> {
    pub fn new(
        positions: &'a [SkyPosition],
        distances: &'a [f64],
        residuals: &'a [f64],
    ) -> Result<Self, EngineError> {
        if positions.len() != distances.len() || positions.len() != residuals.len() {
            return Err(EngineError::invalid(format!(
                "length mismatch: positions={} distances={} residuals={}",
                positions.len(),
                distances.len(),
                residuals.len()
            )));
        }
        if distances.iter().chain(residuals.iter()).any(|v| !v.is_finite()) {
            return Err(EngineError::invalid("non-finite distance or residual in fit data"));
        }
        Ok(Self {
            positions,
            distances,
            residuals,
        })
    }

    /// Same positions/distances with a different residual vector.
    pub fn with_residuals<'b>(&self, residuals: &'b [f64]) -> FitData<'b>
    where
        'a: 'b,
    {
        FitData {
            positions: self.positions,
            distances: self.distances,
            residuals,
        }
    }

    pub fn len(&self) -> usize {
        self.residuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residuals.is_empty()
    }
}

/// Validate per-point weights against the data length.
pub fn validate_weights(weights: Option<&[f64]>, n: usize) -> Result<(), EngineError> {
    let Some(w) = weights else {
        return Ok(());
    };
    if w.len() != n {
        return Err(EngineError::invalid(format!(
            "weights length {} != data length {n}",
            w.len()
        )));
    }
    if w.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
        return Err(EngineError::invalid("weights must be finite and > 0"));
    }
    Ok(())
}

/// Fit `variant` to `data`, starting from `init`, inside `bounds`.
///
/// Absent weights default to `1.0` for every point.
pub fn fit_model(
    variant: &ModelVariant,
    init: &[f64],
    bounds: &ParamBounds,
    data: &FitData<'_>,
    weights: Option<&[f64]>,
    opts: &SolverOptions,
) -> Result<FitResult, EngineError> {
    let k = variant.param_count();
    let n = data.len();

    validate_inputs(variant, init, data.positions)?;
    if bounds.len() != k {
        return Err(EngineError::invalid(format!(
            "bounds have {} entries, {} expects {k}",
            bounds.len(),
            variant.display_name()
        )));
    }
    if n < k {
        return Err(EngineError::InsufficientSample { n, k });
    }
    validate_weights(weights, n)?;

    let problem = Problem {
        variant,
        data,
        weights,
    };

    let mut x = init.to_vec();
    bounds.clamp(&mut x);
    let mut r = problem.residuals(&x);
    let mut cost = half_sq_norm(&r);
    if !cost.is_finite() {
        return Err(EngineError::invalid("initial cost is not finite"));
    }

    let started = Instant::now();
    let mut lambda = opts.initial_damping.max(1e-12);

    for iter in 1..=opts.max_iterations {
        if let Some(limit) = opts.timeout {
            if started.elapsed() > limit {
                return Err(EngineError::FitDidNotConverge {
                    iterations: iter - 1,
                    cost,
                    detail: format!("exceeded wall-clock budget of {limit:?}"),
                });
            }
        }

        let jac = problem.jacobian(&x);
        let grad = jac.transpose() * DVector::from_column_slice(&r);

        let free: Vec<usize> = (0..k)
            .filter(|&j| !pinned_outward(x[j], grad[j], bounds.lower()[j], bounds.upper()[j]))
            .collect();
        let pg_inf = free.iter().map(|&j| grad[j].abs()).fold(0.0, f64::max);
        if free.is_empty() || pg_inf <= opts.gtol {
            return Ok(finish(x, r, cost, iter, "gtol"));
        }

        let jtj = jac.transpose() * &jac;
        let m = free.len();
        let x_norm = x.iter().map(|v| v * v).sum::<f64>().sqrt();

        // Inner loop: raise damping until a step lowers the cost.
        loop {
            let mut a = DMatrix::<f64>::zeros(m, m);
            let mut b = DVector::<f64>::zeros(m);
            for (ri, &gi) in free.iter().enumerate() {
                for (ci, &gj) in free.iter().enumerate() {
                    a[(ri, ci)] = jtj[(gi, gj)];
                }
                a[(ri, ri)] += lambda * jtj[(gi, gi)].max(1e-12);
                b[ri] = -grad[gi];
            }

            let Some(delta) = solve_least_squares(&a, &b) else {
                lambda *= 10.0;
                if lambda > MAX_DAMPING {
                    return Err(not_converged(iter, cost, "damped system is singular"));
                }
                continue;
            };

            let mut x_new = x.clone();
            for (ri, &gi) in free.iter().enumerate() {
                x_new[gi] += delta[ri];
            }
            bounds.clamp(&mut x_new);

            let step_norm = x_new
                .iter()
                .zip(x.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            let small_step = step_norm <= opts.xtol * (opts.xtol + x_norm);

            let r_new = problem.residuals(&x_new);
            let cost_new = half_sq_norm(&r_new);

            if cost_new.is_finite() && cost_new < cost {
                let reduction = cost - cost_new;
                let prev_cost = cost;
                x = x_new;
                r = r_new;
                cost = cost_new;
                lambda = (lambda / 10.0).max(1e-15);
                trace!(iter, cost, lambda, "accepted step");

                if reduction <= opts.ftol * prev_cost {
                    return Ok(finish(x, r, cost, iter, "ftol"));
                }
                if small_step {
                    return Ok(finish(x, r, cost, iter, "xtol"));
                }
                break;
            }

            // No descent from here and the step has become negligible: we are
            // at a (possibly constrained) minimum to within tolerance.
            if small_step {
                return Ok(finish(x, r, cost, iter, "xtol"));
            }
            lambda *= 10.0;
            if lambda > MAX_DAMPING {
                return Err(not_converged(iter, cost, "damping exhausted without descent"));
            }
        }
    }

    Err(not_converged(
        opts.max_iterations,
        cost,
        "iteration budget exhausted",
    ))
}

struct Problem<'p, 'a> {
    variant: &'p ModelVariant,
    data: &'p FitData<'a>,
    weights: Option<&'p [f64]>,
}

impl Problem<'_, '_> {
    fn weight(&self, i: usize) -> f64 {
        self.weights.map_or(1.0, |w| w[i])
    }

    fn residuals(&self, params: &[f64]) -> Vec<f64> {
        (0..self.data.len())
            .map(|i| {
                let pred = predict(self.variant, params, &self.data.positions[i], self.data.distances[i]);
                self.weight(i) * (pred - self.data.residuals[i])
            })
            .collect()
    }

    fn jacobian(&self, params: &[f64]) -> DMatrix<f64> {
        let n = self.data.len();
        let k = params.len();
        let mut jac = DMatrix::<f64>::zeros(n, k);
        let mut row = vec![0.0; k];
        for i in 0..n {
            fill_gradient(self.variant, params, &self.data.positions[i], self.data.distances[i], &mut row);
            let w = self.weight(i);
            for j in 0..k {
                jac[(i, j)] = w * row[j];
            }
        }
        jac
    }
}

/// A parameter sitting on a bound whose descent direction leaves the box.
fn pinned_outward(x: f64, g: f64, lo: f64, hi: f64) -> bool {
    let eps = 1e-12 * (1.0 + lo.abs().max(hi.abs()));
    (x <= lo + eps && g > 0.0) || (x >= hi - eps && g < 0.0)
}

fn half_sq_norm(r: &[f64]) -> f64 {
    0.5 * r.iter().map(|v| v * v).sum::<f64>()
}

fn finish(x: Vec<f64>, r: Vec<f64>, cost: f64, iterations: usize, reason: &str) -> FitResult {
    debug!(iterations, cost, reason, "fit converged");
    FitResult {
        params: ModelParameters { values: x },
        residuals: r,
        cost,
        iterations,
    }
}

fn not_converged(iterations: usize, cost: f64, detail: &str) -> EngineError {
    EngineError::FitDidNotConverge {
        iterations,
        cost,
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignConvention;
    use crate::models::predict_all;
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    fn random_sky(rng: &mut StdRng, n: usize) -> (Vec<SkyPosition>, Vec<f64>) {
        let positions = (0..n)
            .map(|_| {
                let lon = rng.gen_range(0.0..360.0);
                let lat = rng.gen_range(-1.0_f64..1.0).asin().to_degrees();
                SkyPosition::new(lon, Some(lat)).unwrap()
            })
            .collect();
        let distances = (0..n).map(|_| rng.gen_range(1.5..2.0)).collect();
        (positions, distances)
    }

    #[test]
    fn recovers_noiseless_dipole() {
        let mut rng = StdRng::seed_from_u64(11);
        let variant = ModelVariant::StaticDipole { sign: SignConvention::Additive };
        let truth = [0.4, 120.0, 25.0];
        let (positions, distances) = random_sky(&mut rng, 300);
        let y = predict_all(&variant, &truth, &positions, &distances);

        let bounds = variant.default_bounds(2.0).unwrap();
        let data = FitData::new(&positions, &distances, &y).unwrap();
        let fit = fit_model(&variant, &[0.1, 100.0, 0.0], &bounds, &data, None, &SolverOptions::default())
            .unwrap();

        assert!((fit.params.values[0] - 0.4).abs() < 1e-6, "{:?}", fit.params);
        assert!((fit.params.values[1] - 120.0).abs() < 1e-4);
        assert!((fit.params.values[2] - 25.0).abs() < 1e-4);
        assert!(fit.cost < 1e-10);
    }

    #[test]
    fn recovers_precession_with_weights() {
        let mut rng = StdRng::seed_from_u64(5);
        let variant = ModelVariant::PrecessionPhase { frequency: 1128.0, sign: SignConvention::Subtractive };
        let truth = [0.8, 148.9];
        let (positions, distances) = random_sky(&mut rng, 400);
        let noise = Normal::new(0.0, 0.05).unwrap();
        let y: Vec<f64> = predict_all(&variant, &truth, &positions, &distances)
            .into_iter()
            .map(|v| v + noise.sample(&mut rng))
            .collect();
        let weights = vec![1.0 / 0.05; y.len()];

        let bounds = variant.default_bounds(2.0).unwrap();
        let data = FitData::new(&positions, &distances, &y).unwrap();
        let fit = fit_model(&variant, &[0.5, 140.0], &bounds, &data, Some(&weights), &SolverOptions::default())
            .unwrap();

        assert!((fit.params.values[0] - 0.8).abs() < 0.02, "{:?}", fit.params);
        assert!((fit.params.values[1] - 148.9).abs() < 1.0);
        // Weighted residuals have unit scatter at the optimum.
        let rms = (fit.rss() / y.len() as f64).sqrt();
        assert!((rms - 1.0).abs() < 0.15, "rms={rms}");
    }

    #[test]
    fn params_respect_bounds() {
        // Data generated with the opposite sign: the amplitude wants to go
        // negative and must stop on its lower bound.
        let mut rng = StdRng::seed_from_u64(9);
        let variant = ModelVariant::AxisCosine { sign: SignConvention::Additive };
        let (positions, distances) = random_sky(&mut rng, 200);
        let y = predict_all(&variant, &[-1.0, 90.0], &positions, &distances);

        let bounds = ParamBounds::new(vec![0.0, 80.0], vec![5.0, 100.0]).unwrap();
        let data = FitData::new(&positions, &distances, &y).unwrap();
        let fit = fit_model(&variant, &[1.0, 95.0], &bounds, &data, None, &SolverOptions::default())
            .unwrap();
        assert!(bounds.contains(&fit.params.values), "{:?}", fit.params);
        assert!(fit.params.values[0] < 1e-6);
    }

    #[test]
    fn tiny_budget_reports_non_convergence() {
        let mut rng = StdRng::seed_from_u64(2);
        let variant = ModelVariant::StaticDipole { sign: SignConvention::Additive };
        let (positions, distances) = random_sky(&mut rng, 100);
        let y = predict_all(&variant, &[1.0, 300.0, -40.0], &positions, &distances);
        let bounds = variant.default_bounds(2.0).unwrap();
        let data = FitData::new(&positions, &distances, &y).unwrap();
        let opts = SolverOptions {
            max_iterations: 1,
            ..SolverOptions::default()
        };
        let err = fit_model(&variant, &[0.1, 20.0, 40.0], &bounds, &data, None, &opts).unwrap_err();
        assert!(matches!(err, EngineError::FitDidNotConverge { .. }), "{err:?}");
    }

    #[test]
    fn rejects_bad_shapes() {
        let variant = ModelVariant::AxisCosine { sign: SignConvention::Additive };
        let positions = [SkyPosition::new(0.0, None).unwrap()];
        let distances = [1.0];
        let y = [0.5];
        let bounds = variant.default_bounds(1.0).unwrap();
        let data = FitData::new(&positions, &distances, &y).unwrap();
        let err = fit_model(&variant, &[0.1, 0.0], &bounds, &data, None, &SolverOptions::default())
            .unwrap_err();
        assert_eq!(err, EngineError::InsufficientSample { n: 1, k: 2 });

        assert!(FitData::new(&positions, &[1.0, 2.0], &y).is_err());
        assert!(validate_weights(Some(&[0.0]), 1).is_err());
    }
}
