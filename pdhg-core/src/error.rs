//! Error types for the reconstruction engines.

use thiserror::Error;

/// Errors that can occur while setting up or running a reconstruction.
///
/// Every variant is fatal for the run that produced it; the engines never
/// retry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconError {
    /// Operator composition or an operator call received incompatible shapes.
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A sensitivity array had no positive entry to substitute for its zeros.
    #[error("Degenerate sensitivity: {0}")]
    DegenerateSensitivity(String),

    /// Subsets overlap, leave gaps, or carry probabilities that do not sum to 1.
    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    /// Upstream data violated a numerical contract (e.g. negative discriminant).
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// Engine parameters out of range.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Counts, contamination or warm start are malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ReconError {
    pub(crate) fn shape(context: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        ReconError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub(crate) fn length(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        ReconError::ShapeMismatch {
            context: context.into(),
            expected: vec![expected],
            actual: vec![actual],
        }
    }
}

/// Result type for reconstruction operations.
pub type ReconResult<T> = Result<T, ReconError>;
