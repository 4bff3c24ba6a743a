//! Linear least squares solver used for the damped Gauss–Newton step.
//!
//! Every Levenberg–Marquardt iteration solves a small system of the form:
//!
//! ```text
//! minimize ‖A δ − b‖²
//! ```
//!
//! where `A` is either the (weighted) Jacobian stacked with the damping rows or
//! the damped normal matrix. The parameter dimension is tiny (2–3 columns), so
//! an SVD is cheap and handles rank deficiency (e.g. the longitude column
//! vanishing when the amplitude sits on its lower bound).

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_overdetermined_line() {
        // y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn rank_deficient_column_gets_zero_step() {
        // Second column is all zeros: minimum-norm solution leaves it at 0.
        let x = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 0.0]);
        let y = DVector::from_row_slice(&[4.0, 0.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-12);
        assert!(beta[1].abs() < 1e-12);
    }
}
