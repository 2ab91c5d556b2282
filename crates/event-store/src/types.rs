//! Core domain types shared by the trainers, the scorer and the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a user.
pub type UserId = u32;

/// Unique identifier for a movie.
pub type MovieId = u32;

/// Current unix timestamp in seconds.
pub fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The algorithm variants a user can be bucketed into.
///
/// The string form is stable: it keys snapshot files on disk and tags rating
/// events, so renaming a variant invalidates persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Collaborative,
    Svd,
    Content,
    Hybrid,
    Neural,
}

impl Algorithm {
    /// All variants, in snapshot-key order.
    pub const ALL: [Algorithm; 5] = [
        Algorithm::Collaborative,
        Algorithm::Svd,
        Algorithm::Content,
        Algorithm::Hybrid,
        Algorithm::Neural,
    ];

    /// Variants eligible for first-touch random assignment. SVD and neural
    /// stay operator-assigned because their snapshots are not guaranteed to
    /// exist on a fresh deployment.
    pub const ASSIGNABLE: [Algorithm; 3] = [
        Algorithm::Collaborative,
        Algorithm::Content,
        Algorithm::Hybrid,
    ];

    /// Stable snake_case name used for snapshot files and event tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Collaborative => "collaborative",
            Algorithm::Svd => "svd",
            Algorithm::Content => "content",
            Algorithm::Hybrid => "hybrid",
            Algorithm::Neural => "neural",
        }
    }

    /// Parse the stable name back into a variant.
    pub fn parse(s: &str) -> Option<Algorithm> {
        match s {
            "collaborative" => Some(Algorithm::Collaborative),
            "svd" => Some(Algorithm::Svd),
            "content" => Some(Algorithm::Content),
            "hybrid" => Some(Algorithm::Hybrid),
            "neural" => Some(Algorithm::Neural),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A movie in the catalog, including the text fields the content model
/// vectorizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    /// Genre labels, e.g. `["Action", "Sci-Fi"]`.
    pub genres: Vec<String>,
    pub release_year: Option<u16>,
    pub director: String,
    /// Cast members, most prominent first.
    pub cast: Vec<String>,
    /// Plot synopsis; may be empty.
    pub plot: String,
}

impl Movie {
    /// Minimal constructor for movies with no content metadata.
    pub fn new(id: MovieId, title: impl Into<String>, genres: Vec<String>) -> Self {
        Self {
            id,
            title: title.into(),
            genres,
            release_year: None,
            director: String::new(),
            cast: Vec::new(),
            plot: String::new(),
        }
    }
}

/// An explicit star rating. Unique per (user, movie): re-rating overwrites
/// the stored event, it never appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingEvent {
    pub user_id: UserId,
    pub movie_id: MovieId,
    /// Rating value in 1.0..=5.0.
    pub rating: f32,
    /// The variant that recommended the movie, if any. `None` means the user
    /// found the movie on their own.
    pub recommended_by: Option<Algorithm>,
    pub timestamp: i64,
}

/// Implicit-feedback interaction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Watchlist,
    Watching,
    Watched,
    Share,
}

impl InteractionKind {
    /// Implicit-preference weight contributed to SVD training.
    pub fn weight(&self) -> f32 {
        match self {
            InteractionKind::Watchlist => 0.5,
            _ => 0.3,
        }
    }
}

/// A behavioral event used only as an implicit-feedback weight source.
/// Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub kind: InteractionKind,
    /// Watch progress in percent, 0..=100.
    pub progress: u8,
    pub timestamp: i64,
}

/// Per-user profile. `assigned_algorithm` is the sticky A/B bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub assigned_algorithm: Option<Algorithm>,
    pub favorite_genres: Vec<String>,
    pub movies_rated: u32,
}

impl UserProfile {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            assigned_algorithm: None,
            favorite_genres: Vec::new(),
            movies_rated: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_name_round_trip() {
        for algo in Algorithm::ALL {
            assert_eq!(Algorithm::parse(algo.as_str()), Some(algo));
        }
        assert_eq!(Algorithm::parse("bogus"), None);
    }

    #[test]
    fn interaction_weights() {
        assert_eq!(InteractionKind::Watchlist.weight(), 0.5);
        assert_eq!(InteractionKind::View.weight(), 0.3);
        assert_eq!(InteractionKind::Watched.weight(), 0.3);
    }
}
