//! Persisted model artifacts.
//!
//! Every artifact is self-contained: it embeds its own user/movie id
//! orderings and index maps, so scoring never depends on the live store's
//! current id sets. Artifacts are replaced wholesale on retrain.

use crate::tfidf::TfidfVectorizer;
use event_store::{MovieId, UserId};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Collaborative-filtering snapshot: the raw user-item matrix. Similarity is
/// computed lazily at scoring time, so there is nothing fitted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborativeModel {
    pub matrix: Array2<f32>,
    pub user_ids: Vec<UserId>,
    pub movie_ids: Vec<MovieId>,
    pub user_index: HashMap<UserId, usize>,
    pub movie_index: HashMap<MovieId, usize>,
}

/// Truncated-SVD snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvdModel {
    /// (users x components): U . diag(sigma).
    pub user_factors: Array2<f32>,
    /// (movies x components).
    pub movie_factors: Array2<f32>,
    pub user_ids: Vec<UserId>,
    pub movie_ids: Vec<MovieId>,
    pub user_index: HashMap<UserId, usize>,
    pub movie_index: HashMap<MovieId, usize>,
    pub n_components: usize,
    /// Fraction of the matrix energy captured by the kept components.
    pub variance_explained: f32,
}

impl SvdModel {
    /// Predicted preference of `user` for `movie`; `None` when either id was
    /// unseen at training time.
    pub fn predict(&self, user_id: UserId, movie_id: MovieId) -> Option<f32> {
        let row = *self.user_index.get(&user_id)?;
        let col = *self.movie_index.get(&movie_id)?;
        Some(self.user_factors.row(row).dot(&self.movie_factors.row(col)))
    }
}

/// Content-based snapshot: fitted vectorizer state plus the full pairwise
/// cosine-similarity matrix over the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentModel {
    pub vectorizer: TfidfVectorizer,
    /// (movies x vocabulary), rows l2-normalized.
    pub tfidf: Array2<f32>,
    /// (movies x movies) cosine similarity.
    pub similarity: Array2<f32>,
    pub movie_ids: Vec<MovieId>,
    pub movie_index: HashMap<MovieId, usize>,
}
