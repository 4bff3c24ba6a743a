//! Error types.
//!
//! Two layers:
//! - [`EngineError`]: typed, recoverable failures of the statistical core. Callers
//!   may retry (different seed, looser bounds, larger sample) or abort.
//! - [`AppError`]: what the `aniso` binary reports, carrying a process exit code.

use thiserror::Error;

/// Failures raised by the anisotropy engine.
///
/// None of these are ever converted into a NaN or infinite "result".
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Malformed or degenerate input: too few points, non-finite values,
    /// mismatched lengths, invalid bounds.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Nothing left to analyse once domain filters were applied.
    #[error("no observations remain after filtering")]
    EmptyAfterFiltering,

    /// The solver exhausted its iteration (or time) budget.
    #[error("fit did not converge after {iterations} iterations (cost={cost:.6e}): {detail}")]
    FitDidNotConverge {
        iterations: usize,
        cost: f64,
        detail: String,
    },

    /// The null distribution (or the statistic itself) has zero variance.
    #[error("significance is undefined: {0}")]
    UndefinedSignificance(String),

    /// Sample size too small relative to model complexity.
    #[error("insufficient sample: n={n} for k={k} parameters")]
    InsufficientSample { n: usize, k: usize },

    /// An abort signal reached in-flight trials.
    #[error("computation aborted before all trials completed")]
    Aborted,
}

impl EngineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        EngineError::InvalidInput(message.into())
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let exit_code = match err {
            EngineError::InvalidInput(_)
            | EngineError::EmptyAfterFiltering
            | EngineError::InsufficientSample { .. } => 3,
            EngineError::FitDidNotConverge { .. }
            | EngineError::UndefinedSignificance(_)
            | EngineError::Aborted => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_map_to_exit_codes() {
        let data: AppError = EngineError::EmptyAfterFiltering.into();
        assert_eq!(data.exit_code(), 3);

        let numeric: AppError = EngineError::UndefinedSignificance("null_std=0".into()).into();
        assert_eq!(numeric.exit_code(), 4);
        assert!(numeric.to_string().contains("null_std=0"));
    }
}
