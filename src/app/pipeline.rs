//! Shared analysis pipeline used by both `aniso audit` and `aniso simulate`.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! ingest -> residuals -> multistart fit -> permutation significance
//! -> (optional) stability -> information-criterion comparison
//!
//! The subcommands only differ in where the observations come from.

use serde::Serialize;
use tracing::{info, warn};

use crate::detrend::{Baseline, compute_residuals};
use crate::domain::{
    Criterion, FitResult, IcDelta, ModelVariant, ParamBounds, ResidualSeries, SignificanceResult,
    StabilityReport, StatisticKind,
};
use crate::error::{AppError, EngineError};
use crate::fit::{
    FitData, SolverOptions, compare_models_with, fit_multistart, stability, start_grid,
    weighted_null_residuals,
};
use crate::io::ingest::IngestedData;
use crate::math::correlation_sigma_estimate;
use crate::models::axis_offset_deg;
use crate::montecarlo::{AbortHandle, TrialPlan};
use crate::significance::{
    AmplitudeStatistic, CorrelationStatistic, PermutationStatistic, permutation_test,
};

/// Null percentiles included in every report.
pub const REPORTED_PERCENTILES: [f64; 4] = [5.0, 50.0, 95.0, 99.0];

/// Everything one analysis run needs besides the data.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub variant: ModelVariant,
    /// Hypothesis parameters: the correlation template and the first fit start.
    pub initial: Vec<f64>,
    pub bounds: ParamBounds,
    pub baseline: Baseline,
    pub statistic: StatisticKind,
    pub permutations: usize,
    /// `0` skips the stability analysis.
    pub stability_trials: usize,
    pub stability_fraction: f64,
    /// Longitude spread (degrees) under which the axis is reported stable.
    pub stability_threshold_deg: f64,
    pub seed: Option<u64>,
    pub lon_steps: usize,
    pub lat_steps: usize,
    pub criterion: Criterion,
    /// Weight residuals by `1 / error` when the data carries errors.
    pub use_weights: bool,
    pub solver: SolverOptions,
    pub abort: Option<AbortHandle>,
}

/// Pearson r of the residuals against the hypothesis prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HypothesisCorrelation {
    pub r: f64,
    /// `r · √n`, a large-sample shortcut reported next to the permutation sigma.
    pub quick_sigma: f64,
}

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub data: IngestedData,
    pub residuals: ResidualSeries,
    pub weighted: bool,
    pub fit: FitResult,
    /// Angle between the fitted axis and the hypothesis axis.
    pub axis_offset_deg: f64,
    pub correlation: Option<HypothesisCorrelation>,
    pub significance: SignificanceResult,
    pub null_percentiles: Vec<(f64, f64)>,
    pub stability: Option<StabilityReport>,
    pub comparison: IcDelta,
}

/// Execute the full pipeline on already-ingested observations.
pub fn run_analysis(config: &AnalysisConfig, data: IngestedData) -> Result<RunOutput, AppError> {
    let variant = &config.variant;
    if variant.requires_latitude() && !data.set.has_latitudes() {
        return Err(EngineError::invalid(format!(
            "{} needs a latitude column",
            variant.display_name()
        ))
        .into());
    }

    // 1) Residuals.
    let residuals = compute_residuals(&data.set, &config.baseline)?;
    info!(n = residuals.len(), std = residuals.std(), "residuals computed");

    let weights = if config.use_weights {
        data.set.inverse_error_weights()?
    } else {
        None
    };
    let positions = data.set.positions();
    let distances = data.set.distances();
    let fit_data = FitData::new(&positions, &distances, residuals.as_slice())?;

    // 2) Fit from the hypothesis plus a grid of starts.
    let mut starts = vec![config.initial.clone()];
    starts.extend(start_grid(
        variant,
        &config.bounds,
        config.initial.first().copied().unwrap_or(0.0),
        config.lon_steps,
        config.lat_steps,
    )?);
    let fit = fit_multistart(
        variant,
        &starts,
        &config.bounds,
        &fit_data,
        weights.as_deref(),
        &config.solver,
    )?;
    let axis_offset_deg = axis_offset_deg(variant, &fit.params.values, &config.initial);
    info!(params = ?fit.params.values, cost = fit.cost, axis_offset_deg, "best fit");

    // 3) Significance.
    let correlation_stat =
        CorrelationStatistic::new(variant, &config.initial, &positions, &distances)?;
    let correlation = match correlation_stat.evaluate(residuals.as_slice()) {
        Ok(r) => Some(HypothesisCorrelation {
            r,
            quick_sigma: correlation_sigma_estimate(r, residuals.len()),
        }),
        Err(err) => {
            warn!(error = %err, "hypothesis correlation unavailable; skipping r*sqrt(n)");
            None
        }
    };

    let plan = trial_plan(config.permutations, config.seed, config.abort.as_ref());
    let (significance, null) = match config.statistic {
        StatisticKind::Correlation => permutation_test(&residuals, &correlation_stat, &plan)?,
        StatisticKind::Amplitude => {
            let stat = AmplitudeStatistic {
                variant: *variant,
                starts: &starts,
                bounds: &config.bounds,
                positions: &positions,
                distances: &distances,
                weights: weights.as_deref(),
                opts: config.solver.clone(),
            };
            permutation_test(&residuals, &stat, &plan)?
        }
    };
    let null_percentiles = REPORTED_PERCENTILES
        .iter()
        .filter_map(|&q| null.percentile(q).map(|v| (q, v)))
        .collect();

    // 4) Stability, on an independent seed stream.
    let stability = if config.stability_trials > 0 {
        let plan = trial_plan(
            config.stability_trials,
            config.seed.map(|s| s.wrapping_add(1)),
            config.abort.as_ref(),
        );
        Some(stability(
            &fit_data,
            weights.as_deref(),
            variant,
            &starts,
            &config.bounds,
            &plan,
            config.stability_fraction,
            &config.solver,
        )?)
    } else {
        None
    };

    // 5) Directional model vs isotropic null.
    let null_residuals = weighted_null_residuals(residuals.as_slice(), weights.as_deref())?;
    let comparison = compare_models_with(
        &fit.residuals,
        &null_residuals,
        variant.param_count(),
        config.criterion,
    )?;

    Ok(RunOutput {
        data,
        residuals,
        weighted: weights.is_some(),
        fit,
        axis_offset_deg,
        correlation,
        significance,
        null_percentiles,
        stability,
        comparison,
    })
}

fn trial_plan(trials: usize, seed: Option<u64>, abort: Option<&AbortHandle>) -> TrialPlan {
    let plan = TrialPlan::new(trials, seed);
    match abort {
        Some(handle) => plan.with_abort(handle.clone()),
        None => plan,
    }
}
