//! Benchmarks for request-time scoring.
//!
//! Run with: cargo bench --package engine

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use engine::{Scorer, DEFAULT_LIMIT};
use event_store::{Algorithm, EventStore, Movie};
use trainers::{CollaborativeTrainer, ContentTrainer, HybridConfig, ModelRegistry, SvdTrainer};

fn synthetic_store(users: u32, movies: u32) -> EventStore {
    let mut store = EventStore::new();
    for id in 1..=movies {
        let genre = ["Action", "Drama", "Comedy", "Horror"][(id % 4) as usize];
        let mut movie = Movie::new(id, format!("Movie {id}"), vec![genre.to_string()]);
        movie.plot = format!("synthetic plot {genre} {id}");
        store.insert_movie(movie);
    }
    for user in 1..=users {
        // Each user rates a quarter of the catalog with a deterministic
        // preference pattern.
        for movie in 1..=movies {
            if (user + movie) % 4 == 0 {
                let rating = 1.0 + ((user * 7 + movie * 3) % 5) as f32;
                store.submit_rating(user, movie, rating, None).unwrap();
            }
        }
    }
    store
}

fn trained_setup() -> (tempfile::TempDir, EventStore, Scorer) {
    let store = synthetic_store(200, 400);
    let dir = tempfile::tempdir().unwrap();
    let registry = ModelRegistry::new(dir.path());
    registry
        .publish("collaborative", &CollaborativeTrainer::train(&store).unwrap())
        .unwrap();
    registry
        .publish("svd", &SvdTrainer::new().train(&store).unwrap())
        .unwrap();
    registry
        .publish("content", &ContentTrainer::train(&store).unwrap())
        .unwrap();
    registry.publish("hybrid", &HybridConfig::default()).unwrap();
    let scorer = Scorer::new(registry);
    (dir, store, scorer)
}

fn bench_collaborative_scoring(c: &mut Criterion) {
    let (_dir, store, scorer) = trained_setup();
    c.bench_function("score_collaborative", |b| {
        b.iter(|| {
            let scored = scorer
                .score(&store, black_box(1), Algorithm::Collaborative, DEFAULT_LIMIT)
                .unwrap();
            black_box(scored)
        })
    });
}

fn bench_hybrid_scoring(c: &mut Criterion) {
    let (_dir, store, scorer) = trained_setup();
    c.bench_function("score_hybrid", |b| {
        b.iter(|| {
            let scored = scorer
                .score(&store, black_box(1), Algorithm::Hybrid, DEFAULT_LIMIT)
                .unwrap();
            black_box(scored)
        })
    });
}

criterion_group!(benches, bench_collaborative_scoring, bench_hybrid_scoring);
criterion_main!(benches);
