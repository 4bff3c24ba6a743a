//! Sub-sample (jackknife-style) stability of fitted parameters.
//!
//! Each trial draws `round(fraction · n)` observations without replacement,
//! refits the model on that subset and records the parameters. The report
//! carries the full per-trial distribution plus per-parameter summaries; it
//! deliberately does not decide whether a parameter is "stable" (see
//! [`crate::domain::ParamSummary::is_stable`] for the caller-side check).

use rand::seq::index;
use tracing::info;

use crate::domain::{ModelParameters, ModelVariant, ParamBounds, ParamSummary, StabilityReport};
use crate::error::EngineError;
use crate::fit::fitter::{FitData, SolverOptions, validate_weights};
use crate::fit::start_grid::fit_multistart;
use crate::montecarlo::{TrialPlan, run_trials};

/// Run the stability analysis.
///
/// `starts` are the initial guesses for every refit: a single start gives a
/// plain refit, several starts a multi-start refit. Any failed refit fails the
/// whole analysis.
pub fn stability(
    data: &FitData<'_>,
    weights: Option<&[f64]>,
    variant: &ModelVariant,
    starts: &[Vec<f64>],
    bounds: &ParamBounds,
    plan: &TrialPlan,
    fraction: f64,
    opts: &SolverOptions,
) -> Result<StabilityReport, EngineError> {
    if !(fraction.is_finite() && fraction > 0.0 && fraction <= 1.0) {
        return Err(EngineError::invalid(format!(
            "sub-sample fraction must be in (0, 1], got {fraction}"
        )));
    }
    validate_weights(weights, data.len())?;

    let n = data.len();
    let k = variant.param_count();
    let m = ((fraction * n as f64).round() as usize).min(n);
    if m <= k {
        return Err(EngineError::InsufficientSample { n: m, k });
    }

    let trials = run_trials(plan, |_, rng| {
        let mut idx = index::sample(rng, n, m).into_vec();
        idx.sort_unstable();

        let positions: Vec<_> = idx.iter().map(|&i| data.positions[i]).collect();
        let distances: Vec<f64> = idx.iter().map(|&i| data.distances[i]).collect();
        let residuals: Vec<f64> = idx.iter().map(|&i| data.residuals[i]).collect();
        let sub_weights: Option<Vec<f64>> = weights.map(|w| idx.iter().map(|&i| w[i]).collect());

        let sub = FitData::new(&positions, &distances, &residuals)?;
        let fit = fit_multistart(variant, starts, bounds, &sub, sub_weights.as_deref(), opts)?;
        Ok(fit.params)
    })?;

    let summaries = summarize(variant, &trials);
    info!(
        trials = trials.len(),
        subsample = m,
        "stability analysis complete"
    );

    Ok(StabilityReport {
        trials,
        summaries,
        fraction,
        subsample_size: m,
    })
}

fn summarize(variant: &ModelVariant, trials: &[ModelParameters]) -> Vec<ParamSummary> {
    variant
        .param_names()
        .iter()
        .zip(variant.param_kinds().iter())
        .enumerate()
        .map(|(j, (name, kind))| {
            let samples: Vec<f64> = trials.iter().map(|p| p.values[j]).collect();
            ParamSummary::from_samples(name, *kind, &samples)
        })
        .collect()
}
