//! Custom error types for fgpolish operations.

use thiserror::Error;

/// Result type alias for fgpolish operations
pub type Result<T> = std::result::Result<T, FgpolishError>;

/// Error type for fgpolish operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FgpolishError {
    /// An evaluator failed numerically while computing a likelihood.
    ///
    /// Recoverable: the offending evaluator has already been transitioned to
    /// the `Invalid` state when this error is observed, so retrying the
    /// operation against the reduced evaluator set is always safe.
    #[error("Invalid evaluator: {reason}")]
    InvalidEvaluator {
        /// Human-readable description of the numerical failure
        reason: String,
    },

    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// Probability outside the closed unit interval
    #[error("Invalid probability: {value} (must be between 0 and 1)")]
    InvalidProbability {
        /// The invalid probability value
        value: f64,
    },
}

impl FgpolishError {
    /// Creates an `InvalidEvaluator` error with the given reason.
    pub fn invalid_evaluator(reason: impl Into<String>) -> Self {
        Self::InvalidEvaluator { reason: reason.into() }
    }

    /// Returns true if this error is recoverable by dropping the offending
    /// evaluator and retrying.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidEvaluator { .. })
    }
}
