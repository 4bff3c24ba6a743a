//! Permutation significance testing.
//!
//! - `engine`: builds the null distribution by shuffling the residual-to-position
//!   mapping and scores an observed statistic against it
//! - `statistic`: the statistics that can be permuted (correlation, amplitude)

pub mod engine;
pub mod statistic;

pub use engine::*;
pub use statistic::*;
