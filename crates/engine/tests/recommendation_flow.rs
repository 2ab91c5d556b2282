//! Integration tests for the serving flow: training through the scheduler,
//! scoring through the service, and the experiment ledger's view of it all.

use engine::{RecommendationService, Scorer};
use event_store::{Algorithm, EventStore, Movie};
use experiment::{ExperimentLedger, PerformanceLog};
use scheduler::{Retrainer, TaskQueue};
use std::sync::{Arc, RwLock};
use trainers::ModelRegistry;

/// A store with two clear taste clusters and enough ratings per user to
/// clear the hybrid gates.
fn create_test_store() -> EventStore {
    let mut store = EventStore::new();
    for id in 1..=10u32 {
        let genres = if id <= 5 { vec!["Action", "Thriller"] } else { vec!["Romance", "Drama"] };
        let mut movie = Movie::new(
            id,
            format!("Movie {id} (200{})", id % 10),
            genres.into_iter().map(String::from).collect(),
        );
        movie.plot = if id <= 5 {
            format!("explosive chase sequence number {id}")
        } else {
            format!("tender love story number {id}")
        };
        store.insert_movie(movie);
    }

    // Users 1-3 favor the action half, users 4-6 the romance half. Each
    // user leaves two movies of their own cluster unrated so there is
    // something left to recommend.
    for user in 1..=3u32 {
        for movie in 1..=3u32 {
            store.submit_rating(user, movie + user % 2, 5.0, None).unwrap();
        }
        for movie in 6..=8u32 {
            store.submit_rating(user, movie, 1.0, None).unwrap();
        }
    }
    for user in 4..=6u32 {
        for movie in 6..=8u32 {
            store.submit_rating(user, movie + user % 2, 5.0, None).unwrap();
        }
        for movie in 1..=3u32 {
            store.submit_rating(user, movie, 1.0, None).unwrap();
        }
    }
    store
}

struct Setup {
    _dir: tempfile::TempDir,
    store: Arc<RwLock<EventStore>>,
    service: RecommendationService,
    ledger: Arc<ExperimentLedger>,
    performance: Arc<PerformanceLog>,
    queue: Arc<TaskQueue>,
}

fn create_test_setup(assignable: Vec<Algorithm>) -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    let store = Arc::new(RwLock::new(create_test_store()));

    let report = Retrainer::new(Arc::clone(&store), registry.clone()).retrain_all();
    assert_eq!(report.failed(), 0, "training failed: {:?}", report.steps);

    let ledger = Arc::new(ExperimentLedger::new(Arc::clone(&store)));
    let performance = Arc::new(PerformanceLog::new());
    let queue = Arc::new(TaskQueue::new());
    let service = RecommendationService::new(
        Arc::clone(&store),
        Scorer::new(registry),
        Arc::clone(&ledger),
        Arc::clone(&performance),
    )
    .with_assignable(assignable)
    .with_task_queue(Arc::clone(&queue));

    Setup {
        _dir: dir,
        store,
        service,
        ledger,
        performance,
        queue,
    }
}

#[test]
fn serving_records_exposure_and_performance() {
    let setup = create_test_setup(vec![Algorithm::Collaborative]);

    let served = setup.service.get_recommendations(1).unwrap();
    assert_eq!(served.algorithm, Algorithm::Collaborative);
    assert!(!served.recommendations.is_empty());

    // Exposure landed in the ledger with rates recomputed.
    let row = setup.ledger.row(1, Algorithm::Collaborative).unwrap();
    assert_eq!(row.shown, served.recommendations.len() as u64);
    assert_eq!(row.ctr, 0.0);

    // One performance sample with a sane diversity value.
    assert_eq!(setup.performance.len(), 1);
    let stats = setup.performance.aggregate();
    let entry = &stats[&Algorithm::Collaborative];
    assert_eq!(entry.total_tests, 1);
    assert!(entry.avg_diversity >= 0.0 && entry.avg_diversity <= 1.0);
}

#[test]
fn recommendations_never_include_rated_movies() {
    let setup = create_test_setup(vec![Algorithm::Hybrid]);

    for user in 1..=6u32 {
        let served = setup.service.get_recommendations(user).unwrap();
        let rated = setup.store.read().unwrap().rated_movie_ids(user);
        for rec in &served.recommendations {
            assert!(
                !rated.contains(&rec.movie_id),
                "user {user} was recommended already-rated movie {}",
                rec.movie_id
            );
        }
    }
}

#[test]
fn assignment_is_sticky_across_requests() {
    let setup = create_test_setup(Algorithm::ASSIGNABLE.to_vec());

    let first = setup.service.get_recommendations(2).unwrap().algorithm;
    for _ in 0..5 {
        assert_eq!(setup.service.get_recommendations(2).unwrap().algorithm, first);
    }
    assert_eq!(
        setup.store.read().unwrap().assigned_algorithm(2),
        Some(first)
    );
}

#[test]
fn rating_flow_updates_ledger_and_queues_update() {
    let setup = create_test_setup(vec![Algorithm::Collaborative]);
    setup.service.get_recommendations(1).unwrap();

    // New rating: conversion counted, incremental update queued.
    let upsert = setup.service.submit_rating(1, 10, 4.0).unwrap();
    assert!(upsert.created);
    let row = setup.ledger.row(1, Algorithm::Collaborative).unwrap();
    assert_eq!(row.rated, 1);
    assert!((row.avg_rating_given - 4.0).abs() < 1e-9);
    assert_eq!(setup.queue.pending_count(), 1);

    // Re-rate: counters unchanged, derived fields refreshed.
    let upsert = setup.service.submit_rating(1, 10, 2.0).unwrap();
    assert!(!upsert.created);
    let row = setup.ledger.row(1, Algorithm::Collaborative).unwrap();
    assert_eq!(row.rated, 1);
    assert!((row.avg_rating_given - 2.0).abs() < 1e-9);

    // conversion_rate = rated / shown * 100, always recomputed exactly.
    assert!((row.conversion_rate - row.rated as f64 / row.shown as f64 * 100.0).abs() < 1e-9);
}

#[test]
fn clicks_require_a_known_movie() {
    let setup = create_test_setup(vec![Algorithm::Content]);
    setup.service.get_recommendations(1).unwrap();

    setup.service.record_click(1, 6, None).unwrap();
    let row = setup.ledger.row(1, Algorithm::Content).unwrap();
    assert_eq!(row.clicked, 1);
    assert!(row.ctr > 0.0);

    assert!(setup.service.record_click(1, 999, None).is_err());
}

#[test]
fn users_without_ratings_get_an_empty_serve() {
    let setup = create_test_setup(vec![Algorithm::Collaborative]);

    let served = setup.service.get_recommendations(42).unwrap();
    assert!(served.recommendations.is_empty());
    // No exposure is recorded for an empty serve.
    assert!(setup.ledger.row(42, served.algorithm).is_none());
}
