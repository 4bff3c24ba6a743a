//! Spherical geometry on (longitude, latitude) pairs in degrees.

/// Cosine of the great-circle separation between two directions.
///
/// Spherical law of cosines:
/// `cos γ = sin b₁ sin b₂ + cos b₁ cos b₂ cos(l₁ − l₂)`.
/// The result is clamped to `[-1, 1]` to absorb rounding.
pub fn cos_angular_separation(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (b1, b2) = (lat1.to_radians(), lat2.to_radians());
    let dl = (lon1 - lon2).to_radians();
    (b1.sin() * b2.sin() + b1.cos() * b2.cos() * dl.cos()).clamp(-1.0, 1.0)
}

/// Great-circle separation in degrees.
pub fn angular_separation_deg(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    cos_angular_separation(lon1, lat1, lon2, lat2).acos().to_degrees()
}

/// Wrap an angle into `[0, 360)`.
pub fn wrap_deg(angle: f64) -> f64 {
    let w = angle.rem_euclid(360.0);
    // Tiny negative inputs round up to exactly 360.
    if w >= 360.0 { 0.0 } else { w }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separation_of_known_directions() {
        assert!((angular_separation_deg(10.0, 20.0, 10.0, 20.0)).abs() < 1e-6);
        assert!((angular_separation_deg(0.0, 0.0, 90.0, 0.0) - 90.0).abs() < 1e-9);
        assert!((angular_separation_deg(0.0, 90.0, 123.0, -90.0) - 180.0).abs() < 1e-9);
        assert!((cos_angular_separation(0.0, 0.0, 180.0, 0.0) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn wrap_handles_negative_angles() {
        assert!((wrap_deg(-1.0) - 359.0).abs() < 1e-12);
        assert!(wrap_deg(360.0).abs() < 1e-12);
        let tiny = wrap_deg(-1e-15);
        assert!((0.0..360.0).contains(&tiny), "{tiny}");
    }
}
