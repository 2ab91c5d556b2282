//! Feature materialization: turns the event stream into the dense matrices
//! the trainers consume.
//!
//! Every matrix carries its own row/column id orderings and index maps, so a
//! model trained from it stays scoreable even after the live id sets drift.

use crate::error::{Result, StoreError};
use crate::store::EventStore;
use crate::types::{Movie, MovieId, UserId};
use ndarray::Array2;
use std::collections::HashMap;
use tracing::debug;

/// Placeholder text for movies whose content fields are all empty. Guarantees
/// the TF-IDF vocabulary is never globally empty.
pub const EMPTY_TEXT_SENTINEL: &str = "unknown movie metadata";

/// Dense user-item rating matrix with its frozen id orderings.
#[derive(Debug, Clone)]
pub struct UserItemMatrix {
    /// (users x movies), 0.0 for unobserved pairs.
    pub matrix: Array2<f32>,
    pub user_ids: Vec<UserId>,
    pub movie_ids: Vec<MovieId>,
    pub user_index: HashMap<UserId, usize>,
    pub movie_index: HashMap<MovieId, usize>,
}

/// Build the explicit user-item matrix from all rating events.
///
/// Rows are the distinct users with at least one rating, columns the full
/// movie catalog, both in sorted-id order: identical input always produces
/// an identical matrix. Returns `EmptyDataset` when there are no ratings at
/// all; callers treat that as "cannot train".
pub fn build_user_item_matrix(store: &EventStore) -> Result<UserItemMatrix> {
    if store.total_ratings() == 0 {
        return Err(StoreError::EmptyDataset);
    }

    let user_ids = store.rating_users();
    let movie_ids = store.movie_ids();
    let user_index: HashMap<UserId, usize> =
        user_ids.iter().enumerate().map(|(i, &u)| (u, i)).collect();
    let movie_index: HashMap<MovieId, usize> =
        movie_ids.iter().enumerate().map(|(i, &m)| (m, i)).collect();

    let mut matrix = Array2::<f32>::zeros((user_ids.len(), movie_ids.len()));
    for &user_id in &user_ids {
        let row = user_index[&user_id];
        for rating in store.get_user_ratings(user_id) {
            if let Some(&col) = movie_index.get(&rating.movie_id) {
                matrix[[row, col]] = rating.rating;
            }
        }
    }

    debug!(
        users = user_ids.len(),
        movies = movie_ids.len(),
        ratings = store.total_ratings(),
        "built user-item matrix"
    );

    Ok(UserItemMatrix {
        matrix,
        user_ids,
        movie_ids,
        user_index,
        movie_index,
    })
}

/// Build the implicit-feedback matrix aligned to the given orderings.
///
/// Cell value is the mean interaction weight for that (user, movie) pair.
/// No interactions is not a failure: the result is an all-zero matrix of the
/// matching shape.
pub fn build_implicit_matrix(
    store: &EventStore,
    user_ids: &[UserId],
    movie_ids: &[MovieId],
) -> Array2<f32> {
    let user_index: HashMap<UserId, usize> =
        user_ids.iter().enumerate().map(|(i, &u)| (u, i)).collect();
    let movie_index: HashMap<MovieId, usize> =
        movie_ids.iter().enumerate().map(|(i, &m)| (m, i)).collect();

    // (sum, count) per cell, reduced to a mean below.
    let mut accum: HashMap<(usize, usize), (f32, u32)> = HashMap::new();
    for event in store.interactions() {
        let (Some(&row), Some(&col)) = (
            user_index.get(&event.user_id),
            movie_index.get(&event.movie_id),
        ) else {
            continue;
        };
        let entry = accum.entry((row, col)).or_insert((0.0, 0));
        entry.0 += event.kind.weight();
        entry.1 += 1;
    }

    let mut matrix = Array2::<f32>::zeros((user_ids.len(), movie_ids.len()));
    for ((row, col), (sum, count)) in accum {
        matrix[[row, col]] = sum / count as f32;
    }
    matrix
}

/// Concatenate a movie's text fields into one vectorizer document.
///
/// Always non-empty: falls back to [`EMPTY_TEXT_SENTINEL`] when every field
/// is blank. Per-document emptiness elsewhere is fine; this guard is what
/// keeps the *global* vocabulary from ever being empty.
pub fn extract_text_features(movie: &Movie) -> String {
    let text = format!(
        "{} {} {} {}",
        movie.genres.join(" "),
        movie.director,
        movie.cast.join(" "),
        movie.plot
    );
    let text = text.trim();
    if text.is_empty() {
        EMPTY_TEXT_SENTINEL.to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InteractionKind;

    fn create_test_store() -> EventStore {
        let mut store = EventStore::new();
        for id in 1..=3 {
            store.insert_movie(Movie::new(id, format!("Movie {id}"), vec!["Drama".into()]));
        }
        store.submit_rating(10, 1, 5.0, None).unwrap();
        store.submit_rating(10, 2, 3.0, None).unwrap();
        store.submit_rating(20, 3, 4.0, None).unwrap();
        store
    }

    #[test]
    fn test_matrix_shape_and_values() {
        let store = create_test_store();
        let uim = build_user_item_matrix(&store).unwrap();

        assert_eq!(uim.matrix.dim(), (2, 3));
        assert_eq!(uim.user_ids, vec![10, 20]);
        assert_eq!(uim.movie_ids, vec![1, 2, 3]);
        assert_eq!(uim.matrix[[0, 0]], 5.0);
        assert_eq!(uim.matrix[[0, 1]], 3.0);
        assert_eq!(uim.matrix[[0, 2]], 0.0);
        assert_eq!(uim.matrix[[1, 2]], 4.0);
    }

    #[test]
    fn test_matrix_is_deterministic() {
        let store = create_test_store();
        let a = build_user_item_matrix(&store).unwrap();
        let b = build_user_item_matrix(&store).unwrap();
        assert_eq!(a.matrix, b.matrix);
        assert_eq!(a.user_ids, b.user_ids);
        assert_eq!(a.movie_ids, b.movie_ids);
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let mut store = EventStore::new();
        store.insert_movie(Movie::new(1, "Lonely", vec![]));
        assert!(matches!(
            build_user_item_matrix(&store),
            Err(StoreError::EmptyDataset)
        ));
    }

    #[test]
    fn test_implicit_matrix_mean_weights() {
        let mut store = create_test_store();
        store
            .record_interaction(10, 1, InteractionKind::Watchlist, 0)
            .unwrap();
        store
            .record_interaction(10, 1, InteractionKind::View, 0)
            .unwrap();
        store
            .record_interaction(20, 2, InteractionKind::View, 50)
            .unwrap();

        let implicit = build_implicit_matrix(&store, &[10, 20], &[1, 2, 3]);
        assert!((implicit[[0, 0]] - 0.4).abs() < 1e-6); // mean(0.5, 0.3)
        assert!((implicit[[1, 1]] - 0.3).abs() < 1e-6);
        assert_eq!(implicit[[0, 2]], 0.0);
    }

    #[test]
    fn test_implicit_matrix_empty_is_zero_not_error() {
        let store = create_test_store();
        let implicit = build_implicit_matrix(&store, &[10, 20], &[1, 2, 3]);
        assert_eq!(implicit.dim(), (2, 3));
        assert!(implicit.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_text_features_sentinel() {
        let empty = Movie::new(1, "Silent", vec![]);
        assert_eq!(extract_text_features(&empty), EMPTY_TEXT_SENTINEL);

        let mut movie = Movie::new(2, "Loud", vec!["Action".into()]);
        movie.director = "Someone".into();
        let text = extract_text_features(&movie);
        assert!(text.contains("Action"));
        assert!(text.contains("Someone"));
    }
}
