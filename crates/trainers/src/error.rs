//! Error types for model training and the snapshot registry.

use event_store::StoreError;
use thiserror::Error;

/// Errors raised by the snapshot registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No snapshot has been published under this name yet. Surfaced to the
    /// caller as an operator-actionable condition: train first.
    #[error("model snapshot '{name}' not found; train it before scoring")]
    ModelNotFound { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors raised by the trainers.
#[derive(Error, Debug)]
pub enum TrainError {
    /// The training matrix is too degenerate to factor (no ratings, or fewer
    /// than 2 users/movies).
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Every document in the corpus was blank. Defensive: the text-feature
    /// sentinel makes this unreachable in practice.
    #[error("TF-IDF vocabulary is empty; every document was blank")]
    EmptyVocabulary,

    /// The neural trainer was requested but the build carries no numeric-ML
    /// backend (`neural` feature disabled).
    #[error("neural backend not available in this build")]
    BackendUnavailable,

    /// A hybrid policy config failed validation.
    #[error("invalid hybrid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, TrainError>;
