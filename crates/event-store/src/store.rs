//! The in-memory event store: the authoritative record of movies, ratings,
//! interactions and profiles that every trainer reads.
//!
//! The store is deliberately decoupled from any storage engine: trainers
//! consume it as an abstract event source, and the scorer only ever touches
//! it to build the requesting user's live rating vector. Shared access is the
//! caller's concern (the service layer wraps it in `Arc<RwLock<_>>`).

use crate::error::{Result, StoreError};
use crate::types::*;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Outcome of a rating upsert: the stored event plus whether it was newly
/// created (first rating for that (user, movie) pair) or an overwrite.
#[derive(Debug, Clone)]
pub struct RatingUpsert {
    pub event: RatingEvent,
    pub created: bool,
}

/// Authoritative in-memory store for all recommendation events.
#[derive(Debug, Default)]
pub struct EventStore {
    movies: HashMap<MovieId, Movie>,
    /// Ratings keyed by user, then movie. BTreeMap inner keys keep per-user
    /// iteration order deterministic.
    ratings_by_user: HashMap<UserId, BTreeMap<MovieId, RatingEvent>>,
    /// Mirror of the rating values keyed by movie, for catalog statistics.
    ratings_by_movie: HashMap<MovieId, BTreeMap<UserId, f32>>,
    interactions: Vec<InteractionEvent>,
    profiles: HashMap<UserId, UserProfile>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    pub fn insert_movie(&mut self, movie: Movie) {
        self.movies.insert(movie.id, movie);
    }

    pub fn get_movie(&self, id: MovieId) -> Option<&Movie> {
        self.movies.get(&id)
    }

    /// All catalog movie ids, sorted. This ordering is what makes two
    /// training runs over identical input produce identical matrices.
    pub fn movie_ids(&self) -> Vec<MovieId> {
        let mut ids: Vec<MovieId> = self.movies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn movie_count(&self) -> usize {
        self.movies.len()
    }

    /// Catalog-wide average rating for a movie, 0.0 when unrated.
    pub fn movie_average_rating(&self, movie_id: MovieId) -> f32 {
        match self.ratings_by_movie.get(&movie_id) {
            Some(ratings) if !ratings.is_empty() => {
                ratings.values().sum::<f32>() / ratings.len() as f32
            }
            _ => 0.0,
        }
    }

    // ------------------------------------------------------------------
    // Ratings
    // ------------------------------------------------------------------

    /// Insert or overwrite the rating for (user, movie).
    ///
    /// A new rating with the same key replaces the stored event wholesale,
    /// including its `recommended_by` tag (most-recent tag wins). The movie
    /// must exist and the value must be in 1..=5.
    pub fn submit_rating(
        &mut self,
        user_id: UserId,
        movie_id: MovieId,
        rating: f32,
        recommended_by: Option<Algorithm>,
    ) -> Result<RatingUpsert> {
        if !self.movies.contains_key(&movie_id) {
            return Err(StoreError::UnknownMovie(movie_id));
        }
        if !(1.0..=5.0).contains(&rating) {
            return Err(StoreError::InvalidRating {
                user_id,
                movie_id,
                value: rating,
            });
        }

        let event = RatingEvent {
            user_id,
            movie_id,
            rating,
            recommended_by,
            timestamp: now_ts(),
        };

        let created = self
            .ratings_by_user
            .entry(user_id)
            .or_default()
            .insert(movie_id, event.clone())
            .is_none();
        self.ratings_by_movie
            .entry(movie_id)
            .or_default()
            .insert(user_id, rating);

        let rated = self.ratings_by_user[&user_id].len() as u32;
        self.ensure_profile(user_id).movies_rated = rated;

        Ok(RatingUpsert { event, created })
    }

    /// All of a user's ratings, in movie-id order. Empty for unknown users.
    pub fn get_user_ratings(&self, user_id: UserId) -> Vec<&RatingEvent> {
        self.ratings_by_user
            .get(&user_id)
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    pub fn user_rating_count(&self, user_id: UserId) -> usize {
        self.ratings_by_user
            .get(&user_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Movie ids the user has already rated.
    pub fn rated_movie_ids(&self, user_id: UserId) -> HashSet<MovieId> {
        self.ratings_by_user
            .get(&user_id)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Rating values the user gave to movies recommended by `variant`.
    /// This is the authoritative source for the ledger's `avg_rating_given`.
    pub fn ratings_for_variant(&self, user_id: UserId, variant: Algorithm) -> Vec<f32> {
        self.get_user_ratings(user_id)
            .into_iter()
            .filter(|r| r.recommended_by == Some(variant))
            .map(|r| r.rating)
            .collect()
    }

    /// Distinct users with at least one rating, sorted.
    pub fn rating_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .ratings_by_user
            .iter()
            .filter(|(_, m)| !m.is_empty())
            .map(|(u, _)| *u)
            .collect();
        users.sort_unstable();
        users
    }

    pub fn total_ratings(&self) -> usize {
        self.ratings_by_user.values().map(|m| m.len()).sum()
    }

    // ------------------------------------------------------------------
    // Interactions
    // ------------------------------------------------------------------

    /// Append an implicit-feedback event. The movie must exist; progress is
    /// clamped to 0..=100.
    pub fn record_interaction(
        &mut self,
        user_id: UserId,
        movie_id: MovieId,
        kind: InteractionKind,
        progress: u8,
    ) -> Result<()> {
        if !self.movies.contains_key(&movie_id) {
            return Err(StoreError::UnknownMovie(movie_id));
        }
        self.interactions.push(InteractionEvent {
            user_id,
            movie_id,
            kind,
            progress: progress.min(100),
            timestamp: now_ts(),
        });
        Ok(())
    }

    pub fn interactions(&self) -> &[InteractionEvent] {
        &self.interactions
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    pub fn profile(&self, user_id: UserId) -> Option<&UserProfile> {
        self.profiles.get(&user_id)
    }

    /// Get or create the profile for a user.
    pub fn ensure_profile(&mut self, user_id: UserId) -> &mut UserProfile {
        self.profiles
            .entry(user_id)
            .or_insert_with(|| UserProfile::new(user_id))
    }

    /// The user's sticky A/B bucket, if assigned.
    pub fn assigned_algorithm(&self, user_id: UserId) -> Option<Algorithm> {
        self.profiles
            .get(&user_id)
            .and_then(|p| p.assigned_algorithm)
    }

    /// Persist the user's variant bucket. Assignment is sticky: callers only
    /// invoke this when no bucket exists yet.
    pub fn assign_algorithm(&mut self, user_id: UserId, algorithm: Algorithm) {
        self.ensure_profile(user_id).assigned_algorithm = Some(algorithm);
    }

    /// Recompute the profile's top-5 favorite genres from ratings >= 4.0.
    pub fn refresh_favorite_genres(&mut self, user_id: UserId) {
        let mut genre_counts: HashMap<String, u32> = HashMap::new();
        for rating in self.get_user_ratings(user_id) {
            if rating.rating < 4.0 {
                continue;
            }
            if let Some(movie) = self.movies.get(&rating.movie_id) {
                for genre in &movie.genres {
                    *genre_counts.entry(genre.clone()).or_insert(0) += 1;
                }
            }
        }
        let mut top: Vec<(String, u32)> = genre_counts.into_iter().collect();
        top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top.truncate(5);

        let rated = self.user_rating_count(user_id) as u32;
        let profile = self.ensure_profile(user_id);
        profile.favorite_genres = top.into_iter().map(|(g, _)| g).collect();
        profile.movies_rated = rated;
    }

    /// (users-with-ratings, movies, ratings) counts for logging.
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.rating_users().len(),
            self.movies.len(),
            self.total_ratings(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_store() -> EventStore {
        let mut store = EventStore::new();
        store.insert_movie(Movie::new(1, "First", vec!["Action".into()]));
        store.insert_movie(Movie::new(2, "Second", vec!["Drama".into()]));
        store
    }

    #[test]
    fn test_submit_rating_upserts() {
        let mut store = create_test_store();

        let first = store.submit_rating(1, 1, 4.0, None).unwrap();
        assert!(first.created);
        assert_eq!(store.user_rating_count(1), 1);

        // Same key again: overwrite, not append.
        let second = store
            .submit_rating(1, 1, 2.0, Some(Algorithm::Hybrid))
            .unwrap();
        assert!(!second.created);
        assert_eq!(store.user_rating_count(1), 1);

        let ratings = store.get_user_ratings(1);
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].rating, 2.0);
        assert_eq!(ratings[0].recommended_by, Some(Algorithm::Hybrid));
    }

    #[test]
    fn test_submit_rating_validation() {
        let mut store = create_test_store();

        assert!(matches!(
            store.submit_rating(1, 99, 4.0, None),
            Err(StoreError::UnknownMovie(99))
        ));
        assert!(matches!(
            store.submit_rating(1, 1, 0.5, None),
            Err(StoreError::InvalidRating { .. })
        ));
        assert!(matches!(
            store.submit_rating(1, 1, 5.5, None),
            Err(StoreError::InvalidRating { .. })
        ));
    }

    #[test]
    fn test_ratings_for_variant_follows_latest_tag() {
        let mut store = create_test_store();
        store
            .submit_rating(1, 1, 5.0, Some(Algorithm::Collaborative))
            .unwrap();
        store
            .submit_rating(1, 2, 3.0, Some(Algorithm::Content))
            .unwrap();

        assert_eq!(
            store.ratings_for_variant(1, Algorithm::Collaborative),
            vec![5.0]
        );

        // Re-rate movie 1 under a different variant: the old attribution
        // disappears with the overwrite.
        store
            .submit_rating(1, 1, 4.0, Some(Algorithm::Content))
            .unwrap();
        assert!(store
            .ratings_for_variant(1, Algorithm::Collaborative)
            .is_empty());
        assert_eq!(
            store.ratings_for_variant(1, Algorithm::Content),
            vec![4.0, 3.0]
        );
    }

    #[test]
    fn test_movie_average_rating_tracks_upserts() {
        let mut store = create_test_store();
        store.submit_rating(1, 1, 5.0, None).unwrap();
        store.submit_rating(2, 1, 3.0, None).unwrap();
        assert!((store.movie_average_rating(1) - 4.0).abs() < 1e-6);

        store.submit_rating(2, 1, 1.0, None).unwrap();
        assert!((store.movie_average_rating(1) - 3.0).abs() < 1e-6);
        assert_eq!(store.movie_average_rating(2), 0.0);
    }

    #[test]
    fn test_interactions_append_only() {
        let mut store = create_test_store();
        store
            .record_interaction(1, 1, InteractionKind::View, 0)
            .unwrap();
        store
            .record_interaction(1, 1, InteractionKind::Watchlist, 0)
            .unwrap();
        assert_eq!(store.interactions().len(), 2);

        assert!(matches!(
            store.record_interaction(1, 99, InteractionKind::View, 0),
            Err(StoreError::UnknownMovie(99))
        ));
    }

    #[test]
    fn test_favorite_genres_from_high_ratings() {
        let mut store = create_test_store();
        store.insert_movie(Movie::new(3, "Third", vec!["Action".into(), "Sci-Fi".into()]));
        store.submit_rating(1, 1, 5.0, None).unwrap(); // Action
        store.submit_rating(1, 3, 4.0, None).unwrap(); // Action, Sci-Fi
        store.submit_rating(1, 2, 2.0, None).unwrap(); // Drama, below threshold

        store.refresh_favorite_genres(1);
        let profile = store.profile(1).unwrap();
        assert_eq!(profile.favorite_genres[0], "Action");
        assert!(profile.favorite_genres.contains(&"Sci-Fi".to_string()));
        assert!(!profile.favorite_genres.contains(&"Drama".to_string()));
        assert_eq!(profile.movies_rated, 3);
    }

    #[test]
    fn test_assignment_round_trip() {
        let mut store = create_test_store();
        assert_eq!(store.assigned_algorithm(7), None);
        store.assign_algorithm(7, Algorithm::Hybrid);
        assert_eq!(store.assigned_algorithm(7), Some(Algorithm::Hybrid));
    }
}
