//! The full-retrain cycle and the periodic runner.
//!
//! One cycle runs the trainers sequentially (collaborative -> SVD ->
//! content -> hybrid config -> neural) because the hybrid policy reasons
//! about all of them having *attempted* to run, not because of any data
//! dependency. Each step's failure is recorded and the cycle continues.

use crate::task::{TaskKind, TaskQueue};
use event_store::EventStore;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{info, warn};
use trainers::{
    CollaborativeTrainer, ContentTrainer, HybridConfig, ModelRegistry, SvdTrainer,
};

/// Outcome of one trainer step in a retrain cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    /// The step was not attempted (e.g. no numeric-ML backend).
    Skipped(String),
    Failed(String),
}

/// Per-step record of one retrain cycle.
#[derive(Debug, Clone)]
pub struct RetrainReport {
    pub steps: Vec<(&'static str, StepOutcome)>,
}

impl RetrainReport {
    pub fn completed(&self) -> usize {
        self.steps
            .iter()
            .filter(|(_, o)| *o == StepOutcome::Completed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.steps
            .iter()
            .filter(|(_, o)| matches!(o, StepOutcome::Failed(_)))
            .count()
    }
}

/// Runs the training pipeline against the live store and publishes into the
/// registry.
pub struct Retrainer {
    store: Arc<RwLock<EventStore>>,
    registry: ModelRegistry,
}

impl Retrainer {
    pub fn new(store: Arc<RwLock<EventStore>>, registry: ModelRegistry) -> Self {
        Self { store, registry }
    }

    /// Current hybrid policy: the published snapshot when it is valid,
    /// otherwise the default.
    fn current_config(&self) -> HybridConfig {
        match self.registry.load::<HybridConfig>("hybrid") {
            Ok(config) if config.validate().is_ok() => config,
            Ok(_) => {
                warn!("published hybrid config failed validation; using defaults");
                HybridConfig::default()
            }
            Err(_) => HybridConfig::default(),
        }
    }

    /// Run the full sequential retrain cycle. Never returns an error: each
    /// step is isolated and its outcome lands in the report.
    pub fn retrain_all(&self) -> RetrainReport {
        info!("starting full model retrain");
        let config = self.current_config();
        let mut steps = Vec::new();

        steps.push(("collaborative", self.train_collaborative()));
        steps.push(("svd", self.train_svd(&config)));
        steps.push(("content", self.train_content()));
        steps.push(("hybrid", self.publish_hybrid_config(&config)));
        steps.push(("neural", self.train_neural()));

        let report = RetrainReport { steps };
        info!(
            completed = report.completed(),
            failed = report.failed(),
            "retrain cycle finished"
        );
        report
    }

    fn train_collaborative(&self) -> StepOutcome {
        let store = self.store.read().expect("event store lock poisoned");
        let result = CollaborativeTrainer::train(&store)
            .map_err(|e| e.to_string())
            .and_then(|model| {
                self.registry
                    .publish("collaborative", &model)
                    .map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => StepOutcome::Completed,
            Err(e) => {
                warn!(error = %e, "collaborative training failed");
                StepOutcome::Failed(e)
            }
        }
    }

    fn train_svd(&self, config: &HybridConfig) -> StepOutcome {
        let implicit_scale = if config.enable_implicit_feedback {
            config.implicit_weight
        } else {
            0.0
        };
        let store = self.store.read().expect("event store lock poisoned");
        let result = SvdTrainer::new()
            .with_implicit_scale(implicit_scale)
            .train(&store)
            .map_err(|e| e.to_string())
            .and_then(|model| {
                self.registry
                    .publish("svd", &model)
                    .map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => StepOutcome::Completed,
            Err(e) => {
                warn!(error = %e, "SVD training failed");
                StepOutcome::Failed(e)
            }
        }
    }

    fn train_content(&self) -> StepOutcome {
        let store = self.store.read().expect("event store lock poisoned");
        let result = ContentTrainer::train(&store)
            .map_err(|e| e.to_string())
            .and_then(|model| {
                self.registry
                    .publish("content", &model)
                    .map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => StepOutcome::Completed,
            Err(e) => {
                warn!(error = %e, "content training failed");
                StepOutcome::Failed(e)
            }
        }
    }

    /// Publish the default policy only when none exists: a hand-authored
    /// config is never clobbered by the scheduler.
    fn publish_hybrid_config(&self, config: &HybridConfig) -> StepOutcome {
        if self.registry.contains("hybrid") {
            return StepOutcome::Completed;
        }
        match self.registry.publish("hybrid", config) {
            Ok(()) => StepOutcome::Completed,
            Err(e) => {
                warn!(error = %e, "hybrid config publish failed");
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    #[cfg(feature = "neural")]
    fn train_neural(&self) -> StepOutcome {
        use trainers::NeuralTrainer;

        if !trainers::neural_backend_available() {
            warn!("neural backend unavailable; skipping neural training");
            return StepOutcome::Skipped("neural backend unavailable".to_string());
        }
        let store = self.store.read().expect("event store lock poisoned");
        let result = NeuralTrainer::new()
            .train(&store)
            .map_err(|e| e.to_string())
            .and_then(|model| {
                self.registry
                    .publish("neural", &model)
                    .map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => StepOutcome::Completed,
            // Best-effort by design: a neural failure is logged, never fatal.
            Err(e) => {
                warn!(error = %e, "neural training skipped");
                StepOutcome::Failed(e)
            }
        }
    }

    #[cfg(not(feature = "neural"))]
    fn train_neural(&self) -> StepOutcome {
        warn!("neural backend unavailable; skipping neural training");
        StepOutcome::Skipped("neural backend unavailable".to_string())
    }

    /// Cheap on-demand refresh: republish the collaborative snapshot, the
    /// only artifact that is pure matrix construction.
    pub fn incremental_update(&self) -> anyhow::Result<()> {
        let store = self.store.read().expect("event store lock poisoned");
        let model = CollaborativeTrainer::train(&store)?;
        self.registry.publish("collaborative", &model)?;
        Ok(())
    }

    /// Periodic scheduler loop: reconcile orphans once, then on every tick
    /// enqueue a full retrain and drain the pending queue (bounded batch).
    pub async fn run(self: Arc<Self>, queue: Arc<TaskQueue>, interval: Duration) {
        let reconciled = queue.reconcile_startup();
        if reconciled > 0 {
            warn!(reconciled, "failed tasks orphaned by a previous run");
        }

        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            queue.enqueue(TaskKind::FullRetrain, None, None);
            let retrainer = Arc::clone(&self);
            let queue_ref = Arc::clone(&queue);
            // Training is CPU-bound; keep it off the async worker threads.
            let report = tokio::task::spawn_blocking(move || {
                queue_ref.process_pending(10, |task| match task.kind {
                    TaskKind::FullRetrain => {
                        retrainer.retrain_all();
                        Ok(())
                    }
                    TaskKind::IncrementalUpdate => retrainer.incremental_update(),
                })
            })
            .await;
            match report {
                Ok(report) => info!(
                    processed = report.processed,
                    failed = report.failed,
                    "scheduler tick complete"
                ),
                Err(e) => warn!(error = %e, "scheduler batch panicked"),
            }
        }
    }
}
