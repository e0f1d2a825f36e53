//! Error types for the HWDLS solver

use thiserror::Error;

/// Error kinds the solver can return.
///
/// Setter and `configure` errors leave prior state unchanged; `solve` shape
/// errors abort before any mutation of `x`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HwdlsError {
    #[error("invalid shape: expected {expected}, got {actual}")]
    InvalidShape { expected: String, actual: String },

    #[error("invalid number of priority levels: expected {expected}, got {actual}")]
    InvalidPriorityCount { expected: usize, actual: usize },

    #[error("invalid priority index {index}: solver has {num_priorities} levels")]
    InvalidPriority { index: usize, num_priorities: usize },

    #[error("joint weight entry {index} is zero; a zero weight denotes an infinitely movable joint")]
    ZeroJointWeight { index: usize },

    #[error("weight matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("invalid SVD method selector")]
    InvalidSvdMethod,

    #[error("solver used before configure")]
    Unconfigured,
}

/// Result type for HWDLS solver operations.
pub type Result<T> = std::result::Result<T, HwdlsError>;
