//! Collaborative-filtering trainer.
//!
//! There is no fitting step: the artifact is the user-item matrix itself
//! with its frozen orderings. User-to-user similarity is computed lazily at
//! scoring time, because the matrix changes on every retrain and all-pairs
//! similarity would be wasted work for the small active fraction of users.

use crate::artifacts::CollaborativeModel;
use crate::error::Result;
use event_store::{build_user_item_matrix, EventStore};
use tracing::info;

pub struct CollaborativeTrainer;

impl CollaborativeTrainer {
    /// Build the collaborative snapshot from all current rating events.
    ///
    /// Propagates `EmptyDataset` when there are no ratings; the retrain
    /// cycle logs and skips rather than aborting.
    pub fn train(store: &EventStore) -> Result<CollaborativeModel> {
        let uim = build_user_item_matrix(store)?;
        info!(
            users = uim.user_ids.len(),
            movies = uim.movie_ids.len(),
            "collaborative matrix built"
        );
        Ok(CollaborativeModel {
            matrix: uim.matrix,
            user_ids: uim.user_ids,
            movie_ids: uim.movie_ids,
            user_index: uim.user_index,
            movie_index: uim.movie_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainError;
    use event_store::{Movie, StoreError};

    fn create_test_store() -> EventStore {
        let mut store = EventStore::new();
        for id in 1..=4 {
            store.insert_movie(Movie::new(id, format!("Movie {id}"), vec!["Drama".into()]));
        }
        store.submit_rating(1, 1, 5.0, None).unwrap();
        store.submit_rating(2, 2, 3.0, None).unwrap();
        store
    }

    #[test]
    fn test_train_produces_self_contained_artifact() {
        let store = create_test_store();
        let model = CollaborativeTrainer::train(&store).unwrap();

        assert_eq!(model.matrix.dim(), (2, 4));
        assert_eq!(model.user_index[&1], 0);
        assert_eq!(model.movie_index[&2], 1);
        assert_eq!(model.matrix[[0, 0]], 5.0);
    }

    #[test]
    fn test_retraining_is_deterministic() {
        let store = create_test_store();
        let a = CollaborativeTrainer::train(&store).unwrap();
        let b = CollaborativeTrainer::train(&store).unwrap();
        assert_eq!(a.matrix, b.matrix);
        assert_eq!(a.user_ids, b.user_ids);
        assert_eq!(a.movie_ids, b.movie_ids);
    }

    #[test]
    fn test_empty_store_cannot_train() {
        let store = EventStore::new();
        assert!(matches!(
            CollaborativeTrainer::train(&store),
            Err(TrainError::Store(StoreError::EmptyDataset))
        ));
    }
}
