//! Mathematical utilities: least squares, sphere geometry, descriptive statistics.

pub mod ols;
pub mod sphere;
pub mod stats;

pub use ols::*;
pub use sphere::*;
pub use stats::*;
