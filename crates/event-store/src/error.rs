//! Error types for the event-store crate.

use thiserror::Error;

/// Errors raised by the event store and feature materialization.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No rating events exist at all. Trainers must treat this as
    /// "cannot train", not as a crash.
    #[error("no rating events in the store; nothing to train on")]
    EmptyDataset,

    /// A rating or interaction referenced a movie that is not in the catalog.
    #[error("unknown movie: {0}")]
    UnknownMovie(u32),

    /// An operation referenced a user with no profile and no events.
    #[error("unknown user: {0}")]
    UnknownUser(u32),

    /// Rating value outside the 1..=5 range.
    #[error("invalid rating {value} for user {user_id} on movie {movie_id} (must be in 1..=5)")]
    InvalidRating {
        user_id: u32,
        movie_id: u32,
        value: f32,
    },

    /// I/O error while reading a dataset file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A dataset line could not be parsed.
    #[error("parse error at line {line} in {file}: {reason}")]
    Parse {
        file: String,
        line: usize,
        reason: String,
    },
}

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, StoreError>;
