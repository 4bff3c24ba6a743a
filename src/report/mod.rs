//! Terminal reporting.
//!
//! Formatting lives here so the engine and pipeline stay free of presentation
//! concerns and output changes stay localized.

pub mod format;

pub use format::*;
