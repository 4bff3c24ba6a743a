//! Model comparison (directional vs isotropic null) with information criteria.
//!
//! For a residual vector of length `n` with residual sum of squares `RSS`:
//! - AIC = 2k + n · ln(RSS/n)
//! - BIC = k · ln(n) + n · ln(RSS/n)
//!
//! The null model has no free parameters (`k = 0`): it predicts zero
//! everywhere, so its residuals are just the (weighted) residual series.
//! `delta = IC(directional) − IC(null)`; negative values favour the
//! directional model.

use tracing::debug;

use crate::domain::{Criterion, IcDelta};
use crate::error::EngineError;
use crate::fit::fitter::validate_weights;

/// Compare with AIC (the default criterion).
pub fn compare_models(
    fit_residuals: &[f64],
    null_residuals: &[f64],
    k: usize,
) -> Result<IcDelta, EngineError> {
    compare_models_with(fit_residuals, null_residuals, k, Criterion::Aic)
}

/// Compare with an explicit criterion.
pub fn compare_models_with(
    fit_residuals: &[f64],
    null_residuals: &[f64],
    k: usize,
    criterion: Criterion,
) -> Result<IcDelta, EngineError> {
    if fit_residuals.len() != null_residuals.len() {
        return Err(EngineError::invalid(format!(
            "residual length mismatch: fit={} null={}",
            fit_residuals.len(),
            null_residuals.len()
        )));
    }
    let n = fit_residuals.len();
    if n <= k {
        return Err(EngineError::InsufficientSample { n, k });
    }

    let directional = information_criterion(criterion, n, rss(fit_residuals)?, k);
    let null = information_criterion(criterion, n, rss(null_residuals)?, 0);
    let delta = directional - null;
    debug!(?criterion, n, k, delta, "model comparison");

    Ok(IcDelta {
        criterion,
        directional,
        null,
        delta,
        n,
        k,
    })
}

/// Null-model residuals under the same weighting the fitter applies: `w_i · y_i`.
pub fn weighted_null_residuals(
    residuals: &[f64],
    weights: Option<&[f64]>,
) -> Result<Vec<f64>, EngineError> {
    validate_weights(weights, residuals.len())?;
    Ok(match weights {
        Some(w) => residuals.iter().zip(w.iter()).map(|(r, w)| r * w).collect(),
        None => residuals.to_vec(),
    })
}

fn rss(residuals: &[f64]) -> Result<f64, EngineError> {
    let rss: f64 = residuals.iter().map(|r| r * r).sum();
    if !rss.is_finite() {
        return Err(EngineError::invalid("residual sum of squares is not finite"));
    }
    if rss <= 0.0 {
        // ln(0) would make the criterion -inf.
        return Err(EngineError::invalid("residual sum of squares is zero"));
    }
    Ok(rss)
}

fn information_criterion(criterion: Criterion, n: usize, rss: f64, k: usize) -> f64 {
    let n_f = n as f64;
    let fit_term = n_f * (rss / n_f).ln();
    match criterion {
        Criterion::Aic => 2.0 * k as f64 + fit_term,
        Criterion::Bic => k as f64 * n_f.ln() + fit_term,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_residuals_give_zero_delta() {
        let r = [0.3, -1.2, 0.8, 0.1, -0.4];
        let cmp = compare_models(&r, &r, 0).unwrap();
        assert!(cmp.delta.abs() < 1e-12);
    }

    #[test]
    fn aic_matches_formula() {
        let fit = [1.0, -1.0, 1.0, -1.0];
        let null = [2.0, -2.0, 2.0, -2.0];
        let cmp = compare_models(&fit, &null, 3).unwrap();
        // AIC_fit = 6 + 4 ln(1), AIC_null = 4 ln(4)
        assert!((cmp.directional - 6.0).abs() < 1e-12);
        assert!((cmp.null - 4.0 * 4.0_f64.ln()).abs() < 1e-12);
        assert!((cmp.delta - (6.0 - 4.0 * 4.0_f64.ln())).abs() < 1e-12);
    }

    #[test]
    fn bic_penalizes_with_log_n() {
        let fit = [1.0; 10];
        let cmp = compare_models_with(&fit, &fit, 2, Criterion::Bic).unwrap();
        assert!((cmp.delta - 2.0 * 10.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn too_small_sample_is_an_error() {
        let r = [1.0, 2.0, 3.0];
        assert_eq!(
            compare_models(&r, &r, 3).unwrap_err(),
            EngineError::InsufficientSample { n: 3, k: 3 }
        );
    }

    #[test]
    fn zero_rss_is_not_minus_infinity() {
        let zeros = [0.0; 4];
        let ones = [1.0; 4];
        assert!(matches!(
            compare_models(&zeros, &ones, 1),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn null_residuals_apply_weights() {
        let r = weighted_null_residuals(&[1.0, -2.0], Some(&[2.0, 0.5])).unwrap();
        assert_eq!(r, vec![2.0, -1.0]);
        assert!(weighted_null_residuals(&[1.0], Some(&[1.0, 1.0])).is_err());
    }
}
