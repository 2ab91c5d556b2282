//! Per-algorithm scoring against frozen model snapshots.
//!
//! Every path excludes movies the user has already rated, ranks the rest by
//! score (ties broken by the artifact's movie-id ordering) and returns only
//! positively-scored candidates. Scores are internal ranking signals; the
//! public output is always (movie_id, title, genres).
//!
//! A missing snapshot surfaces as `ModelNotFound`; single-algorithm
//! scoring never substitutes another model. The fallback order is a policy
//! the *hybrid* path applies, not silent substitution in here.

use crate::error::{EngineError, Result};
use event_store::{Algorithm, EventStore, MovieId, UserId};
use ndarray::ArrayView1;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};
use trainers::{
    CollaborativeModel, ContentModel, HybridConfig, ModelRegistry, RegistryError, SnapshotHandle,
    SvdModel,
};

/// Recommendations returned per request.
pub const DEFAULT_LIMIT: usize = 10;

/// Most-similar users contributing to the collaborative accumulation.
const NEIGHBOR_POOL: usize = 50;

/// Rating at and above which a movie counts as liked for the content path.
const LIKED_THRESHOLD: f32 = 4.0;

/// What callers see: ranking scores stay internal.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub movie_id: MovieId,
    pub title: String,
    pub genres: Vec<String>,
}

/// Computes ranked candidates for one user from the latest snapshots.
///
/// Snapshots are held through caching handles: scoring reads pre-loaded
/// artifacts from memory and only reloads after an atomic republish.
pub struct Scorer {
    collaborative: SnapshotHandle<CollaborativeModel>,
    svd: SnapshotHandle<SvdModel>,
    content: SnapshotHandle<ContentModel>,
    #[cfg(feature = "neural")]
    neural: SnapshotHandle<trainers::NeuralModel>,
    hybrid: SnapshotHandle<HybridConfig>,
}

impl Scorer {
    pub fn new(registry: ModelRegistry) -> Self {
        Self {
            collaborative: registry.handle(Algorithm::Collaborative.as_str()),
            svd: registry.handle(Algorithm::Svd.as_str()),
            content: registry.handle(Algorithm::Content.as_str()),
            #[cfg(feature = "neural")]
            neural: registry.handle(Algorithm::Neural.as_str()),
            hybrid: registry.handle(Algorithm::Hybrid.as_str()),
        }
    }

    /// Ranked recommendations for `user_id` under `algorithm`.
    #[instrument(skip(self, store))]
    pub fn recommend(
        &self,
        store: &EventStore,
        user_id: UserId,
        algorithm: Algorithm,
        limit: usize,
    ) -> Result<Vec<Recommendation>> {
        let scored = self.score(store, user_id, algorithm, limit)?;
        // Movies that left the catalog since training are dropped here.
        Ok(scored
            .into_iter()
            .filter_map(|(movie_id, _)| {
                store.get_movie(movie_id).map(|movie| Recommendation {
                    movie_id,
                    title: movie.title.clone(),
                    genres: movie.genres.clone(),
                })
            })
            .collect())
    }

    /// Ranked (movie_id, score) pairs under `algorithm`.
    pub fn score(
        &self,
        store: &EventStore,
        user_id: UserId,
        algorithm: Algorithm,
        limit: usize,
    ) -> Result<Vec<(MovieId, f32)>> {
        match algorithm {
            Algorithm::Hybrid => self.score_hybrid(store, user_id, limit),
            single => self.score_single(store, user_id, single, limit),
        }
    }

    fn score_single(
        &self,
        store: &EventStore,
        user_id: UserId,
        algorithm: Algorithm,
        limit: usize,
    ) -> Result<Vec<(MovieId, f32)>> {
        match algorithm {
            Algorithm::Collaborative => self.score_collaborative(store, user_id, limit),
            Algorithm::Svd => self.score_svd(store, user_id, limit),
            Algorithm::Content => self.score_content(store, user_id, limit),
            Algorithm::Neural => self.score_neural(store, user_id, limit),
            Algorithm::Hybrid => unreachable!("hybrid is dispatched before score_single"),
        }
    }

    // ------------------------------------------------------------------
    // Collaborative
    // ------------------------------------------------------------------

    /// Lazy user-to-user similarity over the trained matrix: cosine against
    /// every other user row, top-50 strictly-positive neighbors, scores
    /// accumulated as `similarity x neighbor rating`.
    fn score_collaborative(
        &self,
        store: &EventStore,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<(MovieId, f32)>> {
        let model = self.collaborative.latest()?;

        // The request-time vector uses the user's *live* ratings laid out
        // over the artifact's frozen movie ordering.
        let mut user_vector = vec![0.0f32; model.movie_ids.len()];
        for rating in store.get_user_ratings(user_id) {
            if let Some(&col) = model.movie_index.get(&rating.movie_id) {
                user_vector[col] = rating.rating;
            }
        }

        let own_row = model.user_index.get(&user_id).copied();
        let mut similarities: Vec<(usize, f32)> = (0..model.matrix.nrows())
            .into_par_iter()
            .filter(|&row| Some(row) != own_row)
            .map(|row| (row, cosine(&user_vector, model.matrix.row(row))))
            .collect();
        similarities.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut scores = vec![0.0f32; model.movie_ids.len()];
        for &(row, similarity) in similarities.iter().take(NEIGHBOR_POOL) {
            // Sorted descending: once non-positive, no neighbor contributes.
            if similarity <= 0.0 {
                break;
            }
            for (col, score) in scores.iter_mut().enumerate() {
                *score += similarity * model.matrix[[row, col]];
            }
        }

        debug!(
            user_id,
            neighbors = similarities.iter().take(NEIGHBOR_POOL).filter(|s| s.1 > 0.0).count(),
            "collaborative scoring complete"
        );
        Ok(rank(
            &scores,
            &model.movie_ids,
            &store.rated_movie_ids(user_id),
            limit,
        ))
    }

    // ------------------------------------------------------------------
    // SVD
    // ------------------------------------------------------------------

    fn score_svd(
        &self,
        store: &EventStore,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<(MovieId, f32)>> {
        let model = self.svd.latest()?;
        let Some(&row) = model.user_index.get(&user_id) else {
            return Err(EngineError::UserNotInModel {
                user_id,
                algorithm: Algorithm::Svd,
            });
        };

        let user_factors = model.user_factors.row(row);
        let scores: Vec<f32> = (0..model.movie_ids.len())
            .map(|col| user_factors.dot(&model.movie_factors.row(col)))
            .collect();

        Ok(rank(
            &scores,
            &model.movie_ids,
            &store.rated_movie_ids(user_id),
            limit,
        ))
    }

    // ------------------------------------------------------------------
    // Content
    // ------------------------------------------------------------------

    /// Accumulate the precomputed similarity rows of everything the user
    /// rated highly.
    fn score_content(
        &self,
        store: &EventStore,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<(MovieId, f32)>> {
        let model = self.content.latest()?;

        let liked_rows: Vec<usize> = store
            .get_user_ratings(user_id)
            .into_iter()
            .filter(|r| r.rating >= LIKED_THRESHOLD)
            .filter_map(|r| model.movie_index.get(&r.movie_id).copied())
            .collect();

        let mut scores = vec![0.0f32; model.movie_ids.len()];
        for &row in &liked_rows {
            for (col, score) in scores.iter_mut().enumerate() {
                *score += model.similarity[[row, col]];
            }
        }

        Ok(rank(
            &scores,
            &model.movie_ids,
            &store.rated_movie_ids(user_id),
            limit,
        ))
    }

    // ------------------------------------------------------------------
    // Neural
    // ------------------------------------------------------------------

    #[cfg(feature = "neural")]
    fn score_neural(
        &self,
        store: &EventStore,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<(MovieId, f32)>> {
        let model = self.neural.latest()?;
        if !model.user_index.contains_key(&user_id) {
            return Err(EngineError::UserNotInModel {
                user_id,
                algorithm: Algorithm::Neural,
            });
        }

        let scores: Vec<f32> = model
            .movie_ids
            .iter()
            .map(|&movie_id| model.predict(user_id, movie_id).unwrap_or(0.0))
            .collect();

        Ok(rank(
            &scores,
            &model.movie_ids,
            &store.rated_movie_ids(user_id),
            limit,
        ))
    }

    #[cfg(not(feature = "neural"))]
    fn score_neural(
        &self,
        _store: &EventStore,
        _user_id: UserId,
        _limit: usize,
    ) -> Result<Vec<(MovieId, f32)>> {
        Err(EngineError::VariantUnavailable(Algorithm::Neural))
    }

    // ------------------------------------------------------------------
    // Hybrid
    // ------------------------------------------------------------------

    /// Blend the per-algorithm scores under the persisted policy:
    /// min-ratings gates, per-component min-max normalization, weight
    /// renormalization over the components that actually produced scores,
    /// optional genre-novelty boost, and the fallback-order walk when no
    /// component can contribute.
    fn score_hybrid(
        &self,
        store: &EventStore,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<(MovieId, f32)>> {
        let config = self.hybrid.latest()?;
        config.validate()?;

        let rating_count = store.user_rating_count(user_id);
        let pool = limit.max(DEFAULT_LIMIT) * 5;

        let mut components: Vec<(Algorithm, f32, Vec<(MovieId, f32)>)> = Vec::new();
        for algorithm in [
            Algorithm::Collaborative,
            Algorithm::Svd,
            Algorithm::Content,
            Algorithm::Neural,
        ] {
            let weight = config.weights.get(algorithm);
            if weight <= 0.0 {
                continue;
            }
            let gated = match algorithm {
                Algorithm::Collaborative => rating_count < config.min_ratings_for_collaborative,
                Algorithm::Svd => rating_count < config.min_ratings_for_svd,
                _ => false,
            };
            if gated {
                debug!(user_id, %algorithm, rating_count, "blend component gated by rating count");
                continue;
            }
            match self.score_single(store, user_id, algorithm, pool) {
                Ok(scored) if !scored.is_empty() => components.push((algorithm, weight, scored)),
                Ok(_) => {}
                // Missing or inapplicable components are tolerated here;
                // the fallback order covers the nothing-available case.
                Err(EngineError::Registry(RegistryError::ModelNotFound { .. }))
                | Err(EngineError::UserNotInModel { .. })
                | Err(EngineError::VariantUnavailable(_)) => {
                    debug!(user_id, %algorithm, "blend component unavailable");
                }
                Err(e) => return Err(e),
            }
        }

        if components.is_empty() {
            for &algorithm in &config.fallback_order {
                if algorithm == Algorithm::Hybrid {
                    continue;
                }
                if let Ok(scored) = self.score_single(store, user_id, algorithm, limit) {
                    if !scored.is_empty() {
                        debug!(user_id, %algorithm, "hybrid fell back to single algorithm");
                        return Ok(scored);
                    }
                }
            }
            return Err(EngineError::Registry(RegistryError::ModelNotFound {
                name: "hybrid components".to_string(),
            }));
        }

        let total_weight: f32 = components.iter().map(|(_, w, _)| w).sum();
        let mut blended: HashMap<MovieId, f32> = HashMap::new();
        for (_, weight, scored) in &components {
            let max = scored.iter().map(|(_, s)| *s).fold(f32::MIN, f32::max);
            let min = scored.iter().map(|(_, s)| *s).fold(f32::MAX, f32::min);
            for &(movie_id, score) in scored {
                let normalized = if max > min { (score - min) / (max - min) } else { 1.0 };
                *blended.entry(movie_id).or_insert(0.0) += weight / total_weight * normalized;
            }
        }

        if config.diversity_boost && config.diversity_weight > 0.0 {
            let rated_genres = self.rated_genres(store, user_id);
            let w = config.diversity_weight;
            for (movie_id, score) in blended.iter_mut() {
                let novelty = genre_novelty(store, *movie_id, &rated_genres);
                *score = (1.0 - w) * *score + w * novelty;
            }
        }

        let rated = store.rated_movie_ids(user_id);
        let mut ranked: Vec<(MovieId, f32)> = blended
            .into_iter()
            .filter(|(movie_id, score)| !rated.contains(movie_id) && *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }

    fn rated_genres(&self, store: &EventStore, user_id: UserId) -> HashSet<String> {
        store
            .get_user_ratings(user_id)
            .into_iter()
            .filter_map(|r| store.get_movie(r.movie_id))
            .flat_map(|m| m.genres.iter().cloned())
            .collect()
    }
}

/// Fraction of the movie's genres the user has never rated into.
fn genre_novelty(store: &EventStore, movie_id: MovieId, rated_genres: &HashSet<String>) -> f32 {
    let Some(movie) = store.get_movie(movie_id) else {
        return 0.0;
    };
    if movie.genres.is_empty() {
        return 0.0;
    }
    let novel = movie
        .genres
        .iter()
        .filter(|g| !rated_genres.contains(*g))
        .count();
    novel as f32 / movie.genres.len() as f32
}

fn cosine(a: &[f32], b: ArrayView1<'_, f32>) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_b += y * y;
    }
    let norm_a: f32 = a.iter().map(|x| x * x).sum();
    if norm_a <= 0.0 || norm_b <= 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

/// Rank by score descending with ties kept in the artifact's movie-id
/// order, dropping excluded and non-positive candidates.
fn rank(
    scores: &[f32],
    movie_ids: &[MovieId],
    exclude: &HashSet<MovieId>,
    limit: usize,
) -> Vec<(MovieId, f32)> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    // Stable sort: equal scores keep ascending index order.
    order.sort_by(|&i, &j| {
        scores[j]
            .partial_cmp(&scores[i])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
        .into_iter()
        .filter(|&i| scores[i] > 0.0 && !exclude.contains(&movie_ids[i]))
        .take(limit)
        .map(|i| (movie_ids[i], scores[i]))
        .collect()
}
