use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use engine::{RecommendationService, Scorer, Served};
use event_store::{load_movielens, EventStore, UserId};
use experiment::{ExperimentLedger, PerformanceLog};
use scheduler::{Retrainer, StepOutcome, TaskKind, TaskQueue};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use trainers::ModelRegistry;

/// CineRecs - movie recommendation and experimentation core
#[derive(Parser)]
#[command(name = "cine-recs")]
#[command(about = "Multi-algorithm movie recommender with A/B experiment tracking", long_about = None)]
struct Cli {
    /// Path to the MovieLens 100k dataset directory
    #[arg(short, long, default_value = "data/ml-100k")]
    data_dir: PathBuf,

    /// Directory holding the published model snapshots
    #[arg(short, long, default_value = "ml_models")]
    models_dir: PathBuf,

    /// Load ratings for at most this many users (0 = all)
    #[arg(long, default_value = "50")]
    user_limit: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full retrain cycle and publish every snapshot
    Train,

    /// Get recommendations for a user under their assigned variant
    Recommend {
        #[arg(long)]
        user_id: UserId,

        /// Number of recommendations to return
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Submit (or overwrite) a rating and process the update queue
    Rate {
        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        movie_id: u32,

        /// Rating value in 1..=5
        #[arg(long)]
        rating: f32,
    },

    /// Record a click on a recommended movie
    Click {
        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        movie_id: u32,
    },

    /// Serve a sample of users and print per-algorithm performance
    Stats {
        /// How many users to sample
        #[arg(long, default_value = "20")]
        sample: usize,
    },

    /// Run the periodic retrain scheduler in the foreground
    Schedule {
        /// Seconds between retrain ticks
        #[arg(long, default_value = "86400")]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    println!("Loading dataset from {}...", cli.data_dir.display());
    let start = Instant::now();
    let user_limit = if cli.user_limit == 0 { None } else { Some(cli.user_limit) };
    let store = load_movielens(&cli.data_dir, user_limit)
        .with_context(|| format!("failed to load dataset from {}", cli.data_dir.display()))?;
    let (users, movies, ratings) = store.counts();
    println!(
        "{} {users} users, {movies} movies, {ratings} ratings in {:?}",
        "✓".green(),
        start.elapsed()
    );

    let store = Arc::new(RwLock::new(store));
    let registry = ModelRegistry::new(&cli.models_dir);

    match cli.command {
        Commands::Train => handle_train(store, registry),
        Commands::Recommend { user_id, limit } => handle_recommend(store, registry, user_id, limit),
        Commands::Rate {
            user_id,
            movie_id,
            rating,
        } => handle_rate(store, registry, user_id, movie_id, rating),
        Commands::Click { user_id, movie_id } => handle_click(store, registry, user_id, movie_id),
        Commands::Stats { sample } => handle_stats(store, registry, sample),
        Commands::Schedule { interval_secs } => {
            handle_schedule(store, registry, interval_secs).await
        }
    }
}

fn build_service(
    store: Arc<RwLock<EventStore>>,
    registry: ModelRegistry,
    queue: Arc<TaskQueue>,
) -> RecommendationService {
    let ledger = Arc::new(ExperimentLedger::new(Arc::clone(&store)));
    let performance = Arc::new(PerformanceLog::new());
    RecommendationService::new(store, Scorer::new(registry), ledger, performance)
        .with_task_queue(queue)
}

/// Run one full retrain cycle and report per-step outcomes.
fn handle_train(store: Arc<RwLock<EventStore>>, registry: ModelRegistry) -> Result<()> {
    let retrainer = Retrainer::new(store, registry);
    let report = retrainer.retrain_all();

    println!("{}", "Retrain cycle:".bold().blue());
    for (name, outcome) in &report.steps {
        match outcome {
            StepOutcome::Completed => println!("  {} {name}", "✓".green()),
            StepOutcome::Skipped(reason) => println!("  {} {name}: {reason}", "-".yellow()),
            StepOutcome::Failed(error) => println!("  {} {name}: {error}", "✗".red()),
        }
    }
    println!(
        "{} completed, {} failed",
        report.completed().to_string().green(),
        report.failed().to_string().red()
    );
    Ok(())
}

fn handle_recommend(
    store: Arc<RwLock<EventStore>>,
    registry: ModelRegistry,
    user_id: UserId,
    limit: usize,
) -> Result<()> {
    let queue = Arc::new(TaskQueue::new());
    let service = build_service(store, registry, queue).with_limit(limit);

    let served = service
        .get_recommendations(user_id)
        .map_err(|e| anyhow!(e).context("failed to generate recommendations"))?;
    print_served(&served);

    if let Some(row) = service.ledger().row(user_id, served.algorithm) {
        println!(
            "Experiment row [{}]: shown={} clicked={} rated={} ctr={:.1}% conversion={:.1}%",
            served.algorithm, row.shown, row.clicked, row.rated, row.ctr, row.conversion_rate
        );
    }
    Ok(())
}

fn handle_rate(
    store: Arc<RwLock<EventStore>>,
    registry: ModelRegistry,
    user_id: UserId,
    movie_id: u32,
    rating: f32,
) -> Result<()> {
    let queue = Arc::new(TaskQueue::new());
    let retrainer = Retrainer::new(Arc::clone(&store), registry.clone());
    let service = build_service(store, registry, Arc::clone(&queue));

    let upsert = service
        .submit_rating(user_id, movie_id, rating)
        .map_err(|e| anyhow!(e).context("failed to submit rating"))?;
    println!(
        "{} {} rating for user {user_id} on movie {movie_id}: {rating}",
        "✓".green(),
        if upsert.created { "recorded" } else { "updated" },
    );

    // Drain the incremental-update queue this rating enqueued.
    let report = queue.process_pending(10, |task| match task.kind {
        TaskKind::IncrementalUpdate => retrainer.incremental_update(),
        TaskKind::FullRetrain => {
            retrainer.retrain_all();
            Ok(())
        }
    });
    for task in queue.tasks() {
        println!(
            "  task {} [{:?}] -> {:?}{}",
            task.id,
            task.kind,
            task.status,
            task.error_message
                .as_deref()
                .map(|e| format!(" ({e})"))
                .unwrap_or_default()
        );
    }
    println!("{} model update tasks processed", report.processed);
    Ok(())
}

fn handle_click(
    store: Arc<RwLock<EventStore>>,
    registry: ModelRegistry,
    user_id: UserId,
    movie_id: u32,
) -> Result<()> {
    let queue = Arc::new(TaskQueue::new());
    let service = build_service(store, registry, queue);

    service
        .record_click(user_id, movie_id, None)
        .map_err(|e| anyhow!(e).context("failed to record click"))?;
    println!("{} click recorded for user {user_id} on movie {movie_id}", "✓".green());
    Ok(())
}

/// Serve a sample of users, then print the per-algorithm aggregation the
/// performance dashboard would show.
fn handle_stats(
    store: Arc<RwLock<EventStore>>,
    registry: ModelRegistry,
    sample: usize,
) -> Result<()> {
    let queue = Arc::new(TaskQueue::new());
    let users: Vec<UserId> = {
        let store = store.read().expect("event store lock poisoned");
        store.rating_users().into_iter().take(sample).collect()
    };
    let service = build_service(store, registry, queue);

    let mut served_ok = 0usize;
    for &user_id in &users {
        match service.get_recommendations(user_id) {
            Ok(_) => served_ok += 1,
            Err(e) => println!("  {} user {user_id}: {e}", "✗".red()),
        }
    }
    println!("Served {served_ok}/{} sampled users\n", users.len());

    println!("{}", "Algorithm performance:".bold().blue());
    println!(
        "{:<15} {:>10} {:>12} {:>12} {:>8} {:>7}",
        "algorithm", "avg rating", "avg time (s)", "diversity", "users", "tests"
    );
    for (algorithm, stats) in service.performance().aggregate() {
        println!(
            "{:<15} {:>10.2} {:>12.4} {:>12.2} {:>8} {:>7}",
            algorithm.to_string(),
            stats.avg_rating,
            stats.avg_response_time,
            stats.avg_diversity,
            stats.distinct_users,
            stats.total_tests
        );
    }

    println!("\n{}", "Experiment ledger:".bold().blue());
    for ((user_id, variant), row) in service.ledger().all_rows() {
        println!(
            "  user {user_id:<5} {variant:<15} shown={:<4} clicked={:<3} rated={:<3} ctr={:.1}%",
            row.shown, row.clicked, row.rated, row.ctr
        );
    }
    Ok(())
}

/// Foreground scheduler: periodic full retrains plus queue draining.
async fn handle_schedule(
    store: Arc<RwLock<EventStore>>,
    registry: ModelRegistry,
    interval_secs: u64,
) -> Result<()> {
    let queue = Arc::new(TaskQueue::new());
    let retrainer = Arc::new(Retrainer::new(store, registry));

    println!(
        "Scheduler running: full retrain every {interval_secs}s (ctrl-c to stop)"
    );
    retrainer
        .run(queue, Duration::from_secs(interval_secs))
        .await;
    Ok(())
}

fn print_served(served: &Served) {
    if served.recommendations.is_empty() {
        println!(
            "No recommendations for user {} yet - rate some movies first.",
            served.user_id
        );
        return;
    }
    println!(
        "{} (variant: {})",
        "Recommendations:".bold().blue(),
        served.algorithm.to_string().cyan()
    );
    for (rank, rec) in served.recommendations.iter().enumerate() {
        println!(
            "{:>3}. {} [{}]",
            (rank + 1).to_string().green(),
            rec.title,
            rec.genres.join(", ")
        );
    }
}
