//! Recommendation service: the orchestration layer upstream collaborators
//! call into.
//!
//! Wires together the event store, the scorer, the experiment ledger and
//! the performance log: assignment -> scoring -> exposure recording ->
//! performance sampling, plus rating submission and click recording.

use crate::diversity::diversity_score;
use crate::error::Result;
use crate::scorer::{Recommendation, Scorer, DEFAULT_LIMIT};
use event_store::{Algorithm, EventStore, MovieId, RatingUpsert, StoreError, UserId};
use experiment::{ExperimentLedger, PerformanceLog, PerformanceSample};
use rand::seq::SliceRandom;
use scheduler::TaskQueue;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{info, instrument};

/// One served recommendation response.
#[derive(Debug, Clone)]
pub struct Served {
    pub user_id: UserId,
    pub algorithm: Algorithm,
    pub recommendations: Vec<Recommendation>,
}

/// The core's primary read/write API.
pub struct RecommendationService {
    store: Arc<RwLock<EventStore>>,
    scorer: Scorer,
    ledger: Arc<ExperimentLedger>,
    performance: Arc<PerformanceLog>,
    task_queue: Option<Arc<TaskQueue>>,
    /// Variants eligible for first-touch random assignment.
    assignable: Vec<Algorithm>,
    limit: usize,
}

impl RecommendationService {
    pub fn new(
        store: Arc<RwLock<EventStore>>,
        scorer: Scorer,
        ledger: Arc<ExperimentLedger>,
        performance: Arc<PerformanceLog>,
    ) -> Self {
        Self {
            store,
            scorer,
            ledger,
            performance,
            task_queue: None,
            assignable: Algorithm::ASSIGNABLE.to_vec(),
            limit: DEFAULT_LIMIT,
        }
    }

    /// Attach the model-update queue; rating submissions then enqueue
    /// incremental updates.
    #[must_use]
    pub fn with_task_queue(mut self, queue: Arc<TaskQueue>) -> Self {
        self.task_queue = Some(queue);
        self
    }

    /// Override the variant set used for first-touch assignment.
    #[must_use]
    pub fn with_assignable(mut self, assignable: Vec<Algorithm>) -> Self {
        assert!(!assignable.is_empty(), "assignable variant set cannot be empty");
        self.assignable = assignable;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// The user's sticky variant, assigning one uniformly at random on
    /// first touch.
    pub fn assigned_algorithm(&self, user_id: UserId) -> Algorithm {
        {
            let store = self.store.read().expect("event store lock poisoned");
            if let Some(algorithm) = store.assigned_algorithm(user_id) {
                return algorithm;
            }
        }
        let mut store = self.store.write().expect("event store lock poisoned");
        // Re-check under the write lock: another request may have assigned.
        if let Some(algorithm) = store.assigned_algorithm(user_id) {
            return algorithm;
        }
        let algorithm = *self
            .assignable
            .choose(&mut rand::thread_rng())
            .expect("assignable variant set is never empty");
        store.assign_algorithm(user_id, algorithm);
        info!(user_id, %algorithm, "assigned experiment variant");
        algorithm
    }

    /// The core's primary read API: ranked recommendations for the user's
    /// assigned variant, with exposure recorded in the ledger and a
    /// performance sample appended.
    ///
    /// A user with no ratings gets an empty list (rate something first) and
    /// no exposure is recorded.
    #[instrument(skip(self))]
    pub fn get_recommendations(&self, user_id: UserId) -> Result<Served> {
        let start = Instant::now();
        let algorithm = self.assigned_algorithm(user_id);

        let has_ratings = {
            let store = self.store.read().expect("event store lock poisoned");
            store.user_rating_count(user_id) > 0
        };
        if !has_ratings {
            return Ok(Served {
                user_id,
                algorithm,
                recommendations: Vec::new(),
            });
        }

        let recommendations = {
            let store = self.store.read().expect("event store lock poisoned");
            self.scorer.recommend(&store, user_id, algorithm, self.limit)?
        };

        self.ledger
            .record_shown(user_id, algorithm, recommendations.len() as u64);

        let average_rating = {
            let store = self.store.read().expect("event store lock poisoned");
            if recommendations.is_empty() {
                0.0
            } else {
                recommendations
                    .iter()
                    .map(|r| store.movie_average_rating(r.movie_id) as f64)
                    .sum::<f64>()
                    / recommendations.len() as f64
            }
        };
        self.performance.record(PerformanceSample::new(
            algorithm,
            user_id,
            recommendations.len(),
            average_rating,
            start.elapsed().as_secs_f64(),
            diversity_score(&recommendations),
        ));

        info!(
            user_id,
            %algorithm,
            count = recommendations.len(),
            "served recommendations"
        );
        Ok(Served {
            user_id,
            algorithm,
            recommendations,
        })
    }

    /// Submit (or overwrite) a rating, tagged with the user's assigned
    /// variant. A newly created rating counts as a conversion; a re-rate
    /// only refreshes the row's derived fields.
    pub fn submit_rating(&self, user_id: UserId, movie_id: MovieId, rating: f32) -> Result<RatingUpsert> {
        let algorithm = {
            let store = self.store.read().expect("event store lock poisoned");
            store.assigned_algorithm(user_id).unwrap_or(Algorithm::Hybrid)
        };

        let upsert = {
            let mut store = self.store.write().expect("event store lock poisoned");
            let upsert = store.submit_rating(user_id, movie_id, rating, Some(algorithm))?;
            store.refresh_favorite_genres(user_id);
            upsert
        };

        if upsert.created {
            self.ledger.record_rated(user_id, algorithm);
        } else {
            self.ledger.touch(user_id, algorithm);
        }

        if let Some(queue) = &self.task_queue {
            let task_id = queue.enqueue_incremental(user_id, movie_id);
            info!(user_id, movie_id, task_id, "queued incremental model update");
        }
        Ok(upsert)
    }

    /// Record a click on a recommended movie. The movie must exist; the
    /// failure surfaces per call and is never retried here.
    pub fn record_click(
        &self,
        user_id: UserId,
        movie_id: MovieId,
        variant: Option<Algorithm>,
    ) -> Result<()> {
        {
            let store = self.store.read().expect("event store lock poisoned");
            if store.get_movie(movie_id).is_none() {
                return Err(StoreError::UnknownMovie(movie_id).into());
            }
        }
        let algorithm = match variant {
            Some(v) => v,
            None => {
                let store = self.store.read().expect("event store lock poisoned");
                store.assigned_algorithm(user_id).unwrap_or(Algorithm::Hybrid)
            }
        };
        self.ledger.record_clicked(user_id, algorithm);
        Ok(())
    }

    pub fn ledger(&self) -> &ExperimentLedger {
        &self.ledger
    }

    pub fn performance(&self) -> &PerformanceLog {
        &self.performance
    }
}
