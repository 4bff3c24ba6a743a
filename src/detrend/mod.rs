//! Residual computation (detrending).
//!
//! Each observable is compared against an analytic baseline relation of its
//! distance proxy, e.g. the Hubble-like `5 · log10(z)`:
//!
//! ```text
//! raw_i      = value_i − baseline(distance_i)
//! residual_i = raw_i − mean(raw)
//! ```
//!
//! The output is exactly zero-mean (to floating-point tolerance) and aligned
//! index-for-index with the input set.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ObservationSet, ResidualSeries};
use crate::error::EngineError;
use crate::math::mean;

/// An expected-value relation `distance → baseline`.
pub trait BaselineRelation {
    fn expected(&self, distance: f64) -> f64;

    /// Whether the relation takes a logarithm of the distance (needs `d > 0`).
    fn requires_positive_distance(&self) -> bool {
        false
    }
}

impl<F> BaselineRelation for F
where
    F: Fn(f64) -> f64,
{
    fn expected(&self, distance: f64) -> f64 {
        self(distance)
    }
}

/// Built-in baseline relations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Baseline {
    /// No baseline; only mean-centering is applied.
    None,
    Constant { value: f64 },
    /// `slope · log10(d) + intercept`.
    Log10 { slope: f64, intercept: f64 },
    /// `slope · ln(d) + intercept`.
    Ln { slope: f64, intercept: f64 },
}

impl BaselineRelation for Baseline {
    fn expected(&self, distance: f64) -> f64 {
        match *self {
            Baseline::None => 0.0,
            Baseline::Constant { value } => value,
            Baseline::Log10 { slope, intercept } => slope * distance.log10() + intercept,
            Baseline::Ln { slope, intercept } => slope * distance.ln() + intercept,
        }
    }

    fn requires_positive_distance(&self) -> bool {
        matches!(self, Baseline::Log10 { .. } | Baseline::Ln { .. })
    }
}

/// Detrend an observation set against `baseline` and mean-center the result.
///
/// Errors:
/// - [`EngineError::EmptyAfterFiltering`] when the set is empty
/// - [`EngineError::InvalidInput`] for a single point, non-finite values or
///   distances, non-positive distances under a log baseline, or a baseline
///   that evaluates to a non-finite number
pub fn compute_residuals<B>(set: &ObservationSet, baseline: &B) -> Result<ResidualSeries, EngineError>
where
    B: BaselineRelation + ?Sized,
{
    if set.is_empty() {
        return Err(EngineError::EmptyAfterFiltering);
    }
    if set.len() < 2 {
        return Err(EngineError::invalid(format!(
            "need at least 2 observations to detrend, got {}",
            set.len()
        )));
    }

    let needs_positive = baseline.requires_positive_distance();
    let mut raw = Vec::with_capacity(set.len());
    for (i, obs) in set.observations().iter().enumerate() {
        if !obs.value.is_finite() || !obs.distance.is_finite() {
            return Err(EngineError::invalid(format!(
                "observation {i} has non-finite value/distance ({}, {})",
                obs.value, obs.distance
            )));
        }
        if needs_positive && obs.distance <= 0.0 {
            return Err(EngineError::invalid(format!(
                "observation {i} has distance {} <= 0 under a log baseline",
                obs.distance
            )));
        }
        let expected = baseline.expected(obs.distance);
        if !expected.is_finite() {
            return Err(EngineError::invalid(format!(
                "baseline is non-finite at distance {}",
                obs.distance
            )));
        }
        raw.push(obs.value - expected);
    }

    let centered = center(raw);
    debug!(n = centered.len(), "computed residual series");
    Ok(ResidualSeries::from_centered(centered))
}

/// Subtract the sample mean. A second pass removes the rounding left by the
/// first, which matters when the raw offset is large relative to the scatter.
fn center(mut values: Vec<f64>) -> Vec<f64> {
    for _ in 0..2 {
        let m = mean(&values);
        values.iter_mut().for_each(|v| *v -= m);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Observation, SkyPosition};
    use rand::prelude::*;
    use rand::rngs::StdRng;

    fn obs(distance: f64, value: f64) -> Observation {
        Observation {
            position: SkyPosition::new(0.0, None).unwrap(),
            distance,
            value,
            error: None,
        }
    }

    #[test]
    fn residuals_are_zero_mean() {
        let mut rng = StdRng::seed_from_u64(7);
        let set = ObservationSet::new(
            (0..500)
                .map(|_| {
                    let z: f64 = rng.gen_range(1.5..2.0);
                    obs(z, 19.0 + 5.0 * z.log10() + rng.gen_range(-2.0..2.0))
                })
                .collect(),
        );
        let baseline = Baseline::Log10 { slope: 5.0, intercept: 0.0 };
        let res = compute_residuals(&set, &baseline).unwrap();
        assert_eq!(res.len(), 500);

        let scale = res.as_slice().iter().fold(1.0_f64, |m, v| m.max(v.abs()));
        assert!(res.mean().abs() <= 1e-9 * scale, "mean={}", res.mean());
    }

    #[test]
    fn removes_exact_baseline() {
        let set = ObservationSet::new(vec![obs(1.0, 3.0), obs(10.0, 8.0), obs(100.0, 13.0)]);
        let res = compute_residuals(&set, &Baseline::Log10 { slope: 5.0, intercept: 3.0 }).unwrap();
        for r in res.as_slice() {
            assert!(r.abs() < 1e-12);
        }
    }

    #[test]
    fn closures_work_as_baselines() {
        let set = ObservationSet::new(vec![obs(1.0, 2.0), obs(2.0, 4.0), obs(3.0, 7.0)]);
        let res = compute_residuals(&set, &|d: f64| 2.0 * d).unwrap();
        // raw = [0, 0, 1] -> centered = [-1/3, -1/3, 2/3]
        assert!((res.as_slice()[2] - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_and_too_small_are_distinct_errors() {
        let empty = ObservationSet::default();
        assert_eq!(
            compute_residuals(&empty, &Baseline::None).unwrap_err(),
            EngineError::EmptyAfterFiltering
        );

        let single = ObservationSet::new(vec![obs(1.0, 1.0)]);
        assert!(matches!(
            compute_residuals(&single, &Baseline::None),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn rejects_non_finite_and_non_positive_log_distance() {
        let nan = ObservationSet::new(vec![obs(1.0, f64::NAN), obs(1.0, 1.0)]);
        assert!(matches!(
            compute_residuals(&nan, &Baseline::None),
            Err(EngineError::InvalidInput(_))
        ));

        let zero = ObservationSet::new(vec![obs(0.0, 1.0), obs(1.0, 1.0)]);
        assert!(matches!(
            compute_residuals(&zero, &Baseline::Ln { slope: 1.0, intercept: 0.0 }),
            Err(EngineError::InvalidInput(_))
        ));
        // Zero distance is fine without a logarithm.
        assert!(compute_residuals(&zero, &Baseline::None).is_ok());
    }
}
