//! Error types for scoring and serving.

use event_store::{Algorithm, StoreError, UserId};
use thiserror::Error;
use trainers::{RegistryError, TrainError};

/// Errors surfaced by the scorer and the recommendation service.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Missing snapshot: the operator must train before scoring. The scorer
    /// never substitutes another algorithm on its own.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Train(#[from] TrainError),

    /// The user was not part of the model's training population.
    #[error("user {user_id} is not in the trained {algorithm} model; retrain to include them")]
    UserNotInModel {
        user_id: UserId,
        algorithm: Algorithm,
    },

    /// The variant cannot be served by this build (no numeric-ML backend).
    #[error("variant '{0}' is not servable in this build")]
    VariantUnavailable(Algorithm),
}

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, EngineError>;
