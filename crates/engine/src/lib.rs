//! # Engine Crate
//!
//! The serving half of the recommendation core:
//!
//! - **scorer**: per-algorithm ranked scoring against frozen snapshots
//! - **diversity**: the genre-variety metric reported per serve
//! - **service**: the orchestration API upstream collaborators call
//!   (recommendations, ratings, clicks)
//!
//! Scoring is synchronous, performs no I/O beyond reading a pre-published
//! snapshot, and shares no mutable state across requests, so concurrent
//! serves are safe as long as snapshot publication stays atomic.

pub mod diversity;
pub mod error;
pub mod scorer;
pub mod service;

pub use diversity::diversity_score;
pub use error::{EngineError, Result};
pub use scorer::{Recommendation, Scorer, DEFAULT_LIMIT};
pub use service::{RecommendationService, Served};
