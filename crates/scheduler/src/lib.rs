//! # Scheduler Crate
//!
//! Background work for the recommendation core:
//!
//! - **task**: the model-update task state machine and bounded-batch queue
//! - **retrain**: the sequential full-retrain cycle and the periodic runner
//!
//! Training jobs are offline batch work with no user-facing timeout, but
//! they must be abandonable: tasks left `Processing` by a dead process are
//! reconciled to `Failed` on startup.

pub mod retrain;
pub mod task;

pub use retrain::{RetrainReport, Retrainer, StepOutcome};
pub use task::{BatchReport, ModelUpdateTask, TaskKind, TaskQueue, TaskStatus};
