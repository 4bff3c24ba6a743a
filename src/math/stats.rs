//! Descriptive statistics over plain `f64` slices.
//!
//! Empty inputs yield `0.0` for moments; callers validate sizes up front.

use crate::math::wrap_deg;

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (`ddof = 0`), two-pass.
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (ss / values.len() as f64).sqrt()
}

/// Pearson correlation coefficient.
///
/// Returns `None` when the lengths differ, fewer than two points are given, or
/// either series has zero variance (r is undefined there, not zero).
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x);
    let my = mean(y);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (&a, &b) in x.iter().zip(y.iter()) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    let denom = (sxx * syy).sqrt();
    if !(denom.is_finite() && denom > 1e-300) {
        return None;
    }
    let r = (sxy / denom).clamp(-1.0, 1.0);
    r.is_finite().then_some(r)
}

/// Quick large-sample significance of a correlation: `r · √n`.
///
/// Only an approximation under i.i.d. residuals; reported next to the
/// permutation sigma, never instead of it.
pub fn correlation_sigma_estimate(r: f64, n: usize) -> f64 {
    r * (n as f64).sqrt()
}

/// Linear-interpolated percentile (`q` in `[0, 100]`), numpy's default method.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=100.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Circular mean (in `[0, 360)`) and circular standard deviation, in degrees.
///
/// The std is `sqrt(-2 ln R)` with `R` the mean resultant length. Angles that
/// straddle 0°/360° therefore summarize correctly.
pub fn circular_mean_std_deg(angles_deg: &[f64]) -> (f64, f64) {
    if angles_deg.is_empty() {
        return (0.0, 0.0);
    }
    let n = angles_deg.len() as f64;
    let (s, c) = angles_deg.iter().fold((0.0, 0.0), |(s, c), a| {
        let r = a.to_radians();
        (s + r.sin(), c + r.cos())
    });
    let (s, c) = (s / n, c / n);
    let resultant = (s * s + c * c).sqrt().clamp(f64::MIN_POSITIVE, 1.0);
    let mean = wrap_deg(s.atan2(c).to_degrees());
    let std = (-2.0 * resultant.ln()).max(0.0).sqrt().to_degrees();
    (mean, std)
}
