//! Truncated-SVD matrix-factorization trainer.
//!
//! Factors the combined explicit + weighted-implicit matrix. The component
//! count is bounded by `min(50, min(matrix dimension) - 1)` so it never
//! exceeds the rank headroom of the matrix.

use crate::artifacts::SvdModel;
use crate::error::{Result, TrainError};
use crate::linalg::{energy_captured, truncated_svd};
use event_store::{build_implicit_matrix, build_user_item_matrix, EventStore, StoreError};
use tracing::{debug, info};

/// Default component cap, matching the factorization's observability sweet
/// spot for catalogs in the thousands.
pub const MAX_COMPONENTS: usize = 50;

pub struct SvdTrainer {
    max_components: usize,
    power_iterations: usize,
    seed: u64,
    /// Scale applied to the implicit-feedback matrix before combining;
    /// 0.0 disables implicit feedback entirely.
    implicit_scale: f32,
}

impl Default for SvdTrainer {
    fn default() -> Self {
        Self {
            max_components: MAX_COMPONENTS,
            power_iterations: 7,
            seed: 42,
            implicit_scale: 1.0,
        }
    }
}

impl SvdTrainer {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_components(mut self, max: usize) -> Self {
        self.max_components = max.max(1);
        self
    }

    #[must_use]
    pub fn with_implicit_scale(mut self, scale: f32) -> Self {
        self.implicit_scale = scale.max(0.0);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit the factorization and return the snapshot.
    pub fn train(&self, store: &EventStore) -> Result<SvdModel> {
        let uim = match build_user_item_matrix(store) {
            Ok(uim) => uim,
            Err(StoreError::EmptyDataset) => {
                return Err(TrainError::InsufficientData(
                    "no ratings to factorize".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let (rows, cols) = uim.matrix.dim();
        if rows < 2 || cols < 2 {
            return Err(TrainError::InsufficientData(format!(
                "matrix {rows}x{cols} too small to factorize (need at least 2x2)"
            )));
        }

        let mut combined = uim.matrix.clone();
        if self.implicit_scale > 0.0 {
            let implicit = build_implicit_matrix(store, &uim.user_ids, &uim.movie_ids);
            combined.scaled_add(self.implicit_scale, &implicit);
        }

        let n_components = self.max_components.min(rows.min(cols) - 1);
        debug!(rows, cols, n_components, "factorizing user-item matrix");

        let (u, sigma, vt) = truncated_svd(
            &combined.view(),
            n_components,
            self.power_iterations,
            self.seed,
        );
        let variance_explained = energy_captured(&combined.view(), &sigma);

        // user_factors = U . diag(sigma), movie_factors = V.
        let mut user_factors = u;
        for (col, &s) in sigma.iter().enumerate() {
            user_factors.column_mut(col).mapv_inplace(|v| v * s);
        }
        let movie_factors = vt.t().to_owned();

        info!(
            n_components,
            variance_explained, "SVD model trained"
        );

        Ok(SvdModel {
            user_factors,
            movie_factors,
            user_ids: uim.user_ids,
            movie_ids: uim.movie_ids,
            user_index: uim.user_index,
            movie_index: uim.movie_index,
            n_components,
            variance_explained,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_store::{InteractionKind, Movie};

    fn create_test_store(users: u32, movies: u32) -> EventStore {
        let mut store = EventStore::new();
        for id in 1..=movies {
            store.insert_movie(Movie::new(id, format!("Movie {id}"), vec!["Drama".into()]));
        }
        for user in 1..=users {
            for movie in 1..=movies {
                // Deterministic synthetic preference structure.
                let rating = 1.0 + ((user + movie) % 5) as f32;
                store.submit_rating(user, movie, rating, None).unwrap();
            }
        }
        store
    }

    #[test]
    fn test_component_count_never_exceeds_rank_headroom() {
        let store = create_test_store(3, 6);
        let model = SvdTrainer::new().train(&store).unwrap();
        // min(50, min(3, 6) - 1) = 2
        assert_eq!(model.n_components, 2);
        assert_eq!(model.user_factors.dim(), (3, 2));
        assert_eq!(model.movie_factors.dim(), (6, 2));
        assert!(model.variance_explained > 0.0 && model.variance_explained <= 1.0);
    }

    #[test]
    fn test_predict_reconstructs_preferences() {
        let store = create_test_store(6, 8);
        let model = SvdTrainer::new().train(&store).unwrap();

        // With near-full rank kept, predictions track the observed ratings.
        let predicted = model.predict(1, 1).unwrap();
        assert!((predicted - 3.0).abs() < 1.0);
        assert!(model.predict(99, 1).is_none());
    }

    #[test]
    fn test_no_ratings_is_insufficient_data() {
        let mut store = EventStore::new();
        store.insert_movie(Movie::new(1, "Only", vec![]));
        assert!(matches!(
            SvdTrainer::new().train(&store),
            Err(TrainError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_single_user_is_insufficient_data() {
        let mut store = EventStore::new();
        store.insert_movie(Movie::new(1, "A", vec![]));
        store.insert_movie(Movie::new(2, "B", vec![]));
        store.submit_rating(1, 1, 5.0, None).unwrap();
        assert!(matches!(
            SvdTrainer::new().train(&store),
            Err(TrainError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_implicit_feedback_shifts_the_factorization() {
        let mut store = create_test_store(4, 4);
        store
            .record_interaction(1, 2, InteractionKind::Watchlist, 0)
            .unwrap();

        let with_implicit = SvdTrainer::new().train(&store).unwrap();
        let without = SvdTrainer::new()
            .with_implicit_scale(0.0)
            .train(&store)
            .unwrap();
        assert_ne!(with_implicit.user_factors, without.user_factors);
    }
}
