//! Fitting and post-fit analysis.
//!
//! Responsibilities:
//!
//! - bounded nonlinear least squares for one model (`fitter`)
//! - deterministic multi-start grids evaluated in parallel (`start_grid`)
//! - sub-sample stability of the fitted parameters (`stability`)
//! - information-criterion comparison against the null model (`selection`)

pub mod fitter;
pub mod selection;
pub mod stability;
pub mod start_grid;

pub use fitter::*;
pub use selection::*;
pub use stability::*;
pub use start_grid::*;
