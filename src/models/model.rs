//! Model evaluation for the directional variants.
//!
//! The fitter relies on two primitive operations:
//! - predict the residual contribution at one observation (for costs/statistics)
//! - fill the analytic gradient row `∂predict/∂params` (for the Jacobian)
//!
//! Both are implemented here for each [`ModelVariant`]. Angles are degrees, so
//! every angular derivative carries a `π/180` factor.

use crate::domain::{ModelVariant, SkyPosition};
use crate::error::EngineError;
use crate::math::{angular_separation_deg, cos_angular_separation, wrap_deg};

const DEG: f64 = std::f64::consts::PI / 180.0;

/// Phase of the precessing axis at distance `d`: `(L + frequency/d) mod 360`.
pub fn precession_phase(axis_lon: f64, frequency: f64, distance: f64) -> f64 {
    wrap_deg(axis_lon + frequency / distance)
}

/// Angle in degrees between the axes of two parameter vectors of `variant`.
///
/// Great-circle separation for the dipole, shortest longitude difference
/// (in `[0, 180]`) for the single-angle variants.
pub fn axis_offset_deg(variant: &ModelVariant, a: &[f64], b: &[f64]) -> f64 {
    match variant {
        ModelVariant::StaticDipole { .. } => angular_separation_deg(a[1], a[2], b[1], b[2]),
        ModelVariant::PrecessionPhase { .. } | ModelVariant::AxisCosine { .. } => {
            let d = wrap_deg(a[1] - b[1]);
            d.min(360.0 - d)
        }
    }
}

/// Predicted residual contribution of `variant` at one observation.
///
/// # Panics
/// Panics if `params` is shorter than `variant.param_count()`. Callers validate
/// parameter vectors before entering hot loops.
pub fn predict(variant: &ModelVariant, params: &[f64], position: &SkyPosition, distance: f64) -> f64 {
    let s = variant.sign().factor();
    match *variant {
        ModelVariant::PrecessionPhase { frequency, .. } => {
            let phase = precession_phase(params[1], frequency, distance);
            s * params[0] * distance * ((position.lon_deg - phase) * DEG).cos()
        }
        ModelVariant::StaticDipole { .. } => {
            let lat = position.lat_deg.unwrap_or(0.0);
            let cos_g = cos_angular_separation(position.lon_deg, lat, params[1], params[2]);
            s * params[0] * distance * cos_g
        }
        ModelVariant::AxisCosine { .. } => {
            s * params[0] * ((position.lon_deg - params[1]) * DEG).cos()
        }
    }
}

/// Fill `out` with `∂predict/∂params` at one observation.
///
/// # Panics
/// Panics if `out` or `params` are shorter than `variant.param_count()`.
pub fn fill_gradient(
    variant: &ModelVariant,
    params: &[f64],
    position: &SkyPosition,
    distance: f64,
    out: &mut [f64],
) {
    let s = variant.sign().factor();
    match *variant {
        ModelVariant::PrecessionPhase { frequency, .. } => {
            // x = θ − L − f/d; the `mod 360` does not change cos/sin.
            let x = (position.lon_deg - params[1] - frequency / distance) * DEG;
            out[0] = s * distance * x.cos();
            out[1] = s * params[0] * distance * x.sin() * DEG;
        }
        ModelVariant::StaticDipole { .. } => {
            let b = position.lat_deg.unwrap_or(0.0) * DEG;
            let bp = params[2] * DEG;
            let dl = (position.lon_deg - params[1]) * DEG;
            let cos_g = b.sin() * bp.sin() + b.cos() * bp.cos() * dl.cos();
            let d_lon = b.cos() * bp.cos() * dl.sin() * DEG;
            let d_lat = (b.sin() * bp.cos() - b.cos() * bp.sin() * dl.cos()) * DEG;
            out[0] = s * distance * cos_g;
            out[1] = s * params[0] * distance * d_lon;
            out[2] = s * params[0] * distance * d_lat;
        }
        ModelVariant::AxisCosine { .. } => {
            let x = (position.lon_deg - params[1]) * DEG;
            out[0] = s * x.cos();
            out[1] = s * params[0] * x.sin() * DEG;
        }
    }
}

/// Predictions over a whole dataset.
pub fn predict_all(
    variant: &ModelVariant,
    params: &[f64],
    positions: &[SkyPosition],
    distances: &[f64],
) -> Vec<f64> {
    positions
        .iter()
        .zip(distances.iter())
        .map(|(p, &d)| predict(variant, params, p, d))
        .collect()
}

/// Check that `params` and `positions` are usable with `variant`.
pub fn validate_inputs(
    variant: &ModelVariant,
    params: &[f64],
    positions: &[SkyPosition],
) -> Result<(), EngineError> {
    if params.len() != variant.param_count() {
        return Err(EngineError::invalid(format!(
            "{} expects {} parameters, got {}",
            variant.display_name(),
            variant.param_count(),
            params.len()
        )));
    }
    if params.iter().any(|p| !p.is_finite()) {
        return Err(EngineError::invalid("non-finite model parameter"));
    }
    if let ModelVariant::PrecessionPhase { frequency, .. } = variant {
        if !frequency.is_finite() {
            return Err(EngineError::invalid("non-finite precession frequency"));
        }
    }
    if variant.requires_latitude() && positions.iter().any(|p| p.lat_deg.is_none()) {
        return Err(EngineError::invalid(format!(
            "{} needs a latitude on every observation",
            variant.display_name()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SignConvention;

    fn pos(lon: f64, lat: f64) -> SkyPosition {
        SkyPosition::new(lon, Some(lat)).unwrap()
    }

    #[test]
    fn axis_offset_wraps_and_uses_great_circles() {
        let cosine = ModelVariant::AxisCosine { sign: SignConvention::Additive };
        assert!((axis_offset_deg(&cosine, &[0.1, 350.0], &[0.1, 10.0]) - 20.0).abs() < 1e-9);
        let dipole = ModelVariant::StaticDipole { sign: SignConvention::Additive };
        let off = axis_offset_deg(&dipole, &[0.1, 0.0, 90.0], &[0.1, 123.0, 0.0]);
        assert!((off - 90.0).abs() < 1e-9);
    }

    #[test]
    fn precession_peaks_on_phase() {
        let v = ModelVariant::PrecessionPhase { frequency: 1128.0, sign: SignConvention::Additive };
        let d = 1.7;
        let phase = precession_phase(148.9, 1128.0, d);
        let y = predict(&v, &[0.8, 148.9], &pos(phase, 0.0), d);
        assert!((y - 0.8 * d).abs() < 1e-9);
    }

    #[test]
    fn sign_convention_flips_prediction() {
        let add = ModelVariant::StaticDipole { sign: SignConvention::Additive };
        let sub = ModelVariant::StaticDipole { sign: SignConvention::Subtractive };
        let p = [0.5, 40.0, 10.0];
        let x = pos(60.0, -5.0);
        let a = predict(&add, &p, &x, 1.2);
        let b = predict(&sub, &p, &x, 1.2);
        assert!(a.abs() > 1e-6);
        assert!((a + b).abs() < 1e-12);
    }

    #[test]
    fn dipole_matches_axis_and_antipode() {
        let v = ModelVariant::StaticDipole { sign: SignConvention::Additive };
        let p = [1.0, 200.0, 30.0];
        assert!((predict(&v, &p, &pos(200.0, 30.0), 2.0) - 2.0).abs() < 1e-9);
        assert!((predict(&v, &p, &pos(20.0, -30.0), 2.0) + 2.0).abs() < 1e-9);
    }

    #[test]
    fn analytic_gradient_matches_finite_difference() {
        let variants = [
            (ModelVariant::PrecessionPhase { frequency: 1128.0, sign: SignConvention::Subtractive }, vec![0.7, 120.0]),
            (ModelVariant::StaticDipole { sign: SignConvention::Additive }, vec![0.3, 250.0, -20.0]),
            (ModelVariant::AxisCosine { sign: SignConvention::Additive }, vec![1.5, 148.9]),
        ];
        let x = pos(77.0, 33.0);
        let d = 1.8;
        for (v, params) in variants {
            let mut grad = vec![0.0; v.param_count()];
            fill_gradient(&v, &params, &x, d, &mut grad);
            for j in 0..params.len() {
                let h = 1e-6 * (1.0 + params[j].abs());
                let mut up = params.clone();
                let mut dn = params.clone();
                up[j] += h;
                dn[j] -= h;
                let fd = (predict(&v, &up, &x, d) - predict(&v, &dn, &x, d)) / (2.0 * h);
                assert!(
                    (fd - grad[j]).abs() < 1e-6,
                    "{} param {j}: analytic={} fd={fd}",
                    v.display_name(),
                    grad[j]
                );
            }
        }
    }

    #[test]
    fn dipole_requires_latitudes() {
        let v = ModelVariant::StaticDipole { sign: SignConvention::Additive };
        let positions = [SkyPosition::new(10.0, None).unwrap()];
        assert!(validate_inputs(&v, &[0.1, 0.0, 0.0], &positions).is_err());
        assert!(validate_inputs(&v, &[0.1, 0.0], &[]).is_err());
    }
}
