//! Error types for network initialisation and application

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors raised when a graph is initialised or a model is applied
///
/// Building a [`Graph`](crate::nn::Graph) never fails. Every mismatch between
/// stages is deferred to `init`, where shapes are known.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("{layer}: expected a single tensor, got a tuple of {arity}")]
    ExpectedSingle { layer: &'static str, arity: usize },

    #[error("{layer}: expected a tuple of {expected} inputs, got {found}")]
    ArityMismatch {
        layer: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{layer}: expected {expected}, got feature shape {shape:?}")]
    RankMismatch {
        layer: &'static str,
        expected: &'static str,
        shape: Vec<usize>,
    },

    #[error("{layer}: kernel {kernel:?} does not fit spatial input {spatial:?}")]
    KernelTooLarge {
        layer: &'static str,
        kernel: [usize; 2],
        spatial: [usize; 2],
    },

    #[error("{layer}: invalid hyperparameter: {reason}")]
    InvalidHyperparameter { layer: &'static str, reason: String },

    #[error("unsupported feature rank {0} (tensors carry 1 to 3 feature dimensions)")]
    UnsupportedRank(usize),

    #[error("input mismatch: model was initialised for {expected}, got {found}")]
    InputMismatch { expected: String, found: String },
}
