//! Directional model implementations.
//!
//! Models are implemented as small, pure functions so that fitting and
//! permutation code can stay generic over the variant.

pub mod model;

pub use model::*;
