//! Test statistics for the permutation engine.
//!
//! Two flavours:
//! - [`CorrelationStatistic`]: Pearson r between the residuals and the
//!   prediction of a fixed hypothesis. Predictions are computed once; each
//!   permutation only recomputes r.
//! - [`AmplitudeStatistic`]: the best-fit amplitude, refitted on every
//!   permutation. Much more expensive, but it makes no assumption about where
//!   the axis points.

use crate::domain::{ModelVariant, ParamBounds, SkyPosition};
use crate::error::EngineError;
use crate::fit::{FitData, SolverOptions, fit_multistart};
use crate::math::pearson;
use crate::models::{predict_all, validate_inputs};
use crate::significance::engine::PermutationStatistic;

/// Correlation of residuals with a fixed model prediction.
#[derive(Debug, Clone)]
pub struct CorrelationStatistic {
    prediction: Vec<f64>,
}

impl CorrelationStatistic {
    /// Predict `variant` at `params` over the dataset geometry.
    pub fn new(
        variant: &ModelVariant,
        params: &[f64],
        positions: &[SkyPosition],
        distances: &[f64],
    ) -> Result<Self, EngineError> {
        validate_inputs(variant, params, positions)?;
        if positions.len() != distances.len() {
            return Err(EngineError::invalid(format!(
                "length mismatch: positions={} distances={}",
                positions.len(),
                distances.len()
            )));
        }
        Self::from_predictions(predict_all(variant, params, positions, distances))
    }

    /// Use precomputed predictions directly.
    pub fn from_predictions(prediction: Vec<f64>) -> Result<Self, EngineError> {
        if prediction.iter().any(|v| !v.is_finite()) {
            return Err(EngineError::invalid("non-finite model prediction"));
        }
        Ok(Self { prediction })
    }

    pub fn prediction(&self) -> &[f64] {
        &self.prediction
    }
}

impl PermutationStatistic for CorrelationStatistic {
    fn evaluate(&self, residuals: &[f64]) -> Result<f64, EngineError> {
        if residuals.len() != self.prediction.len() {
            return Err(EngineError::invalid(format!(
                "residual length {} != prediction length {}",
                residuals.len(),
                self.prediction.len()
            )));
        }
        pearson(residuals, &self.prediction).ok_or_else(|| {
            EngineError::UndefinedSignificance(
                "correlation undefined: residuals or prediction have zero variance".into(),
            )
        })
    }
}

/// Best-fit amplitude of `variant`, refitted from `starts` for every series.
#[derive(Debug, Clone)]
pub struct AmplitudeStatistic<'a> {
    pub variant: ModelVariant,
    pub starts: &'a [Vec<f64>],
    pub bounds: &'a ParamBounds,
    pub positions: &'a [SkyPosition],
    pub distances: &'a [f64],
    pub weights: Option<&'a [f64]>,
    pub opts: SolverOptions,
}

impl PermutationStatistic for AmplitudeStatistic<'_> {
    fn evaluate(&self, residuals: &[f64]) -> Result<f64, EngineError> {
        let data = FitData::new(self.positions, self.distances, residuals)?;
        let fit = fit_multistart(
            &self.variant,
            self.starts,
            self.bounds,
            &data,
            self.weights,
            &self.opts,
        )?;
        Ok(fit.params.amplitude())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detrend::{Baseline, compute_residuals};
    use crate::domain::{Observation, ObservationSet, SignConvention};
    use crate::fit::start_grid;
    use crate::montecarlo::TrialPlan;
    use crate::significance::engine::permutation_test;
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    fn isotropic_positions(rng: &mut StdRng, n: usize) -> Vec<SkyPosition> {
        (0..n)
            .map(|_| {
                let lon = rng.gen_range(0.0..360.0);
                let lat = rng.gen_range(-1.0f64..1.0).asin().to_degrees();
                SkyPosition::new(lon, Some(lat)).unwrap()
            })
            .collect()
    }

    #[test]
    fn sign_convention_flips_correlation() {
        let mut rng = StdRng::seed_from_u64(8);
        let positions = isotropic_positions(&mut rng, 200);
        let distances: Vec<f64> = (0..200).map(|_| rng.gen_range(1.5..2.0)).collect();
        let residuals: Vec<f64> = (0..200).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let params = [0.8, 120.0];

        let add = ModelVariant::PrecessionPhase { frequency: 1128.0, sign: SignConvention::Additive };
        let sub = ModelVariant::PrecessionPhase { frequency: 1128.0, sign: SignConvention::Subtractive };
        let r_add = CorrelationStatistic::new(&add, &params, &positions, &distances)
            .unwrap()
            .evaluate(&residuals)
            .unwrap();
        let r_sub = CorrelationStatistic::new(&sub, &params, &positions, &distances)
            .unwrap()
            .evaluate(&residuals)
            .unwrap();
        assert!((r_add + r_sub).abs() < 1e-12, "{r_add} vs {r_sub}");
    }

    #[test]
    fn correlation_rejects_mismatched_lengths() {
        let stat = CorrelationStatistic::from_predictions(vec![1.0, 2.0, 3.0]).unwrap();
        assert!(matches!(stat.evaluate(&[1.0, 2.0]), Err(EngineError::InvalidInput(_))));
        assert!(CorrelationStatistic::from_predictions(vec![f64::NAN]).is_err());
    }

    #[test]
    fn injected_dipole_is_recovered_and_significant() {
        let mut rng = StdRng::seed_from_u64(77);
        let n = 2000;
        let variant = ModelVariant::StaticDipole { sign: SignConvention::Additive };
        let truth = [0.5, 200.0, 30.0];
        let positions = isotropic_positions(&mut rng, n);
        let distances: Vec<f64> = (0..n).map(|_| rng.gen_range(1.0..2.0)).collect();
        let signal = predict_all(&variant, &truth, &positions, &distances);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let set = ObservationSet::new(
            positions
                .iter()
                .zip(distances.iter())
                .zip(signal.iter())
                .map(|((&position, &distance), &s)| Observation {
                    position,
                    distance,
                    value: s + noise.sample(&mut rng),
                    error: None,
                })
                .collect(),
        );
        let residuals = compute_residuals(&set, &Baseline::None).unwrap();

        let bounds = variant.default_bounds(3.0).unwrap();
        let starts = start_grid(&variant, &bounds, 0.1, 4, 3).unwrap();
        let stat = AmplitudeStatistic {
            variant,
            starts: &starts,
            bounds: &bounds,
            positions: &positions,
            distances: &distances,
            weights: None,
            opts: SolverOptions::default(),
        };

        let (result, null) = permutation_test(&residuals, &stat, &TrialPlan::new(40, Some(5))).unwrap();
        let amp = result.observed_statistic;
        assert!((amp - 0.5).abs() < 0.1, "amplitude {amp}");
        assert!(result.sigma > 5.0, "sigma {}", result.sigma);
        assert_eq!(null.len(), 40);
        assert!((result.p_value - 1.0 / 41.0).abs() < 1e-12);
    }
}
