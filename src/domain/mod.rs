//! Domain types used throughout the engine.
//!
//! This module defines:
//!
//! - input data (`Observation`, `ObservationSet`, `SkyPosition`)
//! - derived series (`ResidualSeries`, `NullDistribution`)
//! - model description (`ModelVariant`, `SignConvention`, `ParamBounds`)
//! - engine outputs (`FitResult`, `SignificanceResult`, `StabilityReport`, `IcDelta`)

pub mod types;

pub use types::*;
