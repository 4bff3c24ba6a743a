//! Significance engine.
//!
//! The null hypothesis is "no directional signal": residuals are exchangeable
//! across positions. We therefore build the null by fully shuffling the
//! residual series (positions and distances held fixed), which destroys any
//! spatial correlation while keeping the univariate residual distribution
//! exactly. No parametric re-draw is involved.
//!
//! ```text
//! sigma = (observed − mean(null)) / std(null)
//! ```
//!
//! A zero-variance null makes sigma undefined; that is an error, not ±inf.

use rand::seq::SliceRandom;
use tracing::info;

use crate::domain::{NullDistribution, ResidualSeries, SignificanceResult};
use crate::error::EngineError;
use crate::montecarlo::{TrialPlan, run_trials};

/// Relative floor under which a null standard deviation counts as zero.
const NULL_STD_FLOOR: f64 = 1e-12;

/// A statistic recomputed on each permuted residual series.
pub trait PermutationStatistic: Sync {
    fn evaluate(&self, residuals: &[f64]) -> Result<f64, EngineError>;
}

impl<F> PermutationStatistic for F
where
    F: Fn(&[f64]) -> Result<f64, EngineError> + Sync,
{
    fn evaluate(&self, residuals: &[f64]) -> Result<f64, EngineError> {
        self(residuals)
    }
}

/// Build the permutation null distribution of `statistic`.
///
/// Either all `plan.trials` permutations complete or the call fails.
pub fn null_distribution<S>(
    residuals: &ResidualSeries,
    statistic: &S,
    plan: &TrialPlan,
) -> Result<NullDistribution, EngineError>
where
    S: PermutationStatistic + ?Sized,
{
    if residuals.len() < 2 {
        return Err(EngineError::invalid("need at least 2 residuals to permute"));
    }

    let values = run_trials(plan, |_, rng| {
        let mut shuffled = residuals.to_vec();
        shuffled.shuffle(rng);
        let v = statistic.evaluate(&shuffled)?;
        if !v.is_finite() {
            return Err(EngineError::UndefinedSignificance(format!(
                "permuted statistic is not finite ({v})"
            )));
        }
        Ok(v)
    })?;

    Ok(NullDistribution::from_complete(values))
}

/// Score an observed statistic against a complete null distribution.
pub fn score(observed: f64, null: &NullDistribution) -> Result<SignificanceResult, EngineError> {
    if !observed.is_finite() {
        return Err(EngineError::invalid(format!("observed statistic is not finite ({observed})")));
    }
    if null.len() < 2 {
        return Err(EngineError::UndefinedSignificance(format!(
            "null distribution has {} value(s)",
            null.len()
        )));
    }

    let null_mean = null.mean();
    let null_std = null.std();
    if !(null_std.is_finite() && null_std > NULL_STD_FLOOR * null_mean.abs().max(1.0)) {
        return Err(EngineError::UndefinedSignificance(format!(
            "null distribution has zero variance (std={null_std:e})"
        )));
    }

    Ok(SignificanceResult {
        observed_statistic: observed,
        null_mean,
        null_std,
        sigma: (observed - null_mean) / null_std,
        p_value: null.upper_tail_p_value(observed),
        trials: null.len(),
    })
}

/// Significance of a caller-supplied observed statistic.
pub fn significance<S>(
    observed: f64,
    residuals: &ResidualSeries,
    statistic: &S,
    plan: &TrialPlan,
) -> Result<SignificanceResult, EngineError>
where
    S: PermutationStatistic + ?Sized,
{
    let null = null_distribution(residuals, statistic, plan)?;
    let result = score(observed, &null)?;
    info!(
        observed = result.observed_statistic,
        sigma = result.sigma,
        trials = result.trials,
        "permutation significance"
    );
    Ok(result)
}

/// Evaluate the statistic on the unpermuted residuals, then test it.
///
/// Returns the null distribution too, for percentile reporting.
pub fn permutation_test<S>(
    residuals: &ResidualSeries,
    statistic: &S,
    plan: &TrialPlan,
) -> Result<(SignificanceResult, NullDistribution), EngineError>
where
    S: PermutationStatistic + ?Sized,
{
    let observed = statistic.evaluate(residuals.as_slice())?;
    let null = null_distribution(residuals, statistic, plan)?;
    let result = score(observed, &null)?;
    info!(observed, sigma = result.sigma, trials = result.trials, "permutation test");
    Ok((result, null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detrend::{Baseline, compute_residuals};
    use crate::domain::{ModelVariant, Observation, ObservationSet, SignConvention, SkyPosition};
    use crate::montecarlo::AbortHandle;
    use crate::significance::statistic::CorrelationStatistic;
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    fn noise_set(rng: &mut StdRng, n: usize) -> ObservationSet {
        let noise = Normal::new(0.0, 1.0).unwrap();
        ObservationSet::new(
            (0..n)
                .map(|_| Observation {
                    position: SkyPosition::new(rng.gen_range(0.0..360.0), None).unwrap(),
                    distance: rng.gen_range(1.5..2.0),
                    value: noise.sample(rng),
                    error: None,
                })
                .collect(),
        )
    }

    fn precession() -> ModelVariant {
        ModelVariant::PrecessionPhase { frequency: 1128.0, sign: SignConvention::Subtractive }
    }

    #[test]
    fn fixed_seed_gives_identical_null() {
        let mut rng = StdRng::seed_from_u64(1);
        let set = noise_set(&mut rng, 300);
        let res = compute_residuals(&set, &Baseline::None).unwrap();
        let stat = CorrelationStatistic::new(&precession(), &[0.794, 148.9], &set.positions(), &set.distances())
            .unwrap();

        let plan = TrialPlan::new(200, Some(2024));
        let a = null_distribution(&res, &stat, &plan).unwrap();
        let b = null_distribution(&res, &stat, &plan).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 200);

        let other = null_distribution(&res, &stat, &TrialPlan::new(200, Some(2025))).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn pure_noise_sigma_is_calibrated() {
        // 1000 isotropic noise points per run: |sigma| <= 4 in at least 99 of
        // 100 runs and |sigma| <= 3 in at least 95 of them.
        let variant = precession();
        let mut within_4 = 0;
        let mut within_3 = 0;
        for run in 0..100u64 {
            let mut rng = StdRng::seed_from_u64(10_000 + run);
            let set = noise_set(&mut rng, 1000);
            let res = compute_residuals(&set, &Baseline::None).unwrap();
            let stat =
                CorrelationStatistic::new(&variant, &[0.794, 148.9], &set.positions(), &set.distances())
                    .unwrap();
            let (result, _) = permutation_test(&res, &stat, &TrialPlan::new(200, Some(run))).unwrap();
            if result.sigma.abs() <= 4.0 {
                within_4 += 1;
            }
            if result.sigma.abs() <= 3.0 {
                within_3 += 1;
            }
        }
        assert!(within_4 >= 99, "within_4={within_4}");
        assert!(within_3 >= 95, "within_3={within_3}");
    }

    #[test]
    fn identical_residuals_make_significance_undefined() {
        let positions: Vec<SkyPosition> = (0..20)
            .map(|i| SkyPosition::new(i as f64 * 18.0, None).unwrap())
            .collect();
        let set = ObservationSet::new(
            positions
                .iter()
                .map(|&position| Observation { position, distance: 1.7, value: 3.0, error: None })
                .collect(),
        );
        let res = compute_residuals(&set, &Baseline::None).unwrap();
        let stat = CorrelationStatistic::new(&precession(), &[0.5, 10.0], &set.positions(), &set.distances())
            .unwrap();
        let err = significance(0.0, &res, &stat, &TrialPlan::new(50, Some(1))).unwrap_err();
        assert!(matches!(err, EngineError::UndefinedSignificance(_)), "{err:?}");

        // A statistic that is finite but constant under permutation fails the same way.
        let mean_stat = |r: &[f64]| -> Result<f64, EngineError> { Ok(r.iter().sum::<f64>()) };
        let err = significance(0.0, &res, &mean_stat, &TrialPlan::new(50, Some(1))).unwrap_err();
        assert!(matches!(err, EngineError::UndefinedSignificance(_)), "{err:?}");
    }

    #[test]
    fn score_computes_sigma_and_p_value() {
        let null = NullDistribution::from_complete(vec![-1.0, 1.0, -1.0, 1.0]);
        let r = score(3.0, &null).unwrap();
        assert!((r.null_mean).abs() < 1e-12);
        assert!((r.null_std - 1.0).abs() < 1e-12);
        assert!((r.sigma - 3.0).abs() < 1e-12);
        assert!((r.p_value - 0.2).abs() < 1e-12);
        assert!(score(f64::NAN, &null).is_err());
    }

    #[test]
    fn abort_yields_no_partial_null() {
        let mut rng = StdRng::seed_from_u64(4);
        let set = noise_set(&mut rng, 50);
        let res = compute_residuals(&set, &Baseline::None).unwrap();
        let abort = AbortHandle::new();
        abort.abort();
        let plan = TrialPlan::new(100, Some(1)).with_abort(abort);
        let stat = |r: &[f64]| -> Result<f64, EngineError> { Ok(r[0]) };
        assert_eq!(null_distribution(&res, &stat, &plan).unwrap_err(), EngineError::Aborted);
    }
}
