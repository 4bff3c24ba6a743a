//! `aniso-audit` library crate.
//!
//! The binary (`aniso`) is a thin wrapper around this library so that:
//!
//! - the statistical core is testable without spawning processes
//! - the engine is reusable from other front-ends (notebooks, services)
//!
//! Core operations:
//! - [`detrend::compute_residuals`]
//! - [`fit::fit_model`] (and [`fit::fit_multistart`])
//! - [`significance::significance`] (and [`significance::permutation_test`])
//! - [`fit::stability`]
//! - [`fit::compare_models`]

pub mod app;
pub mod cli;
pub mod data;
pub mod detrend;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod montecarlo;
pub mod report;
pub mod significance;
