//! Model-update task queue and state machine.
//!
//! Tasks move `Pending -> Processing -> {Completed | Failed}`. No transition
//! skips `Processing` and no task regresses from a terminal state. The queue
//! is an append-only audit log: tasks are never deleted.

use event_store::{now_ts, MovieId, UserId};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    IncrementalUpdate,
    FullRetrain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One model-update unit of work with its full audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct ModelUpdateTask {
    pub id: u64,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub triggered_by_user: Option<UserId>,
    pub triggered_by_rating: Option<(UserId, MovieId)>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error_message: Option<String>,
}

/// Summary of one `process_pending` call.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Append-only task queue. Batch processing is single-consumer; enqueueing
/// is safe from any thread.
#[derive(Default)]
pub struct TaskQueue {
    tasks: Mutex<Vec<ModelUpdateTask>>,
    next_id: AtomicU64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task and return its id.
    pub fn enqueue(
        &self,
        kind: TaskKind,
        triggered_by_user: Option<UserId>,
        triggered_by_rating: Option<(UserId, MovieId)>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let task = ModelUpdateTask {
            id,
            kind,
            status: TaskStatus::Pending,
            triggered_by_user,
            triggered_by_rating,
            created_at: now_ts(),
            started_at: None,
            completed_at: None,
            error_message: None,
        };
        self.tasks
            .lock()
            .expect("task queue lock poisoned")
            .push(task);
        id
    }

    /// Convenience wrapper for the rating-triggered incremental update.
    pub fn enqueue_incremental(&self, user_id: UserId, movie_id: MovieId) -> u64 {
        self.enqueue(
            TaskKind::IncrementalUpdate,
            Some(user_id),
            Some((user_id, movie_id)),
        )
    }

    /// Process up to `batch` pending tasks in created order.
    ///
    /// Each task is marked `Processing` with a start timestamp before the
    /// executor runs, then transitioned to its terminal state with a
    /// completion timestamp. One task's failure is recorded (error text
    /// preserved for operators) and never blocks the rest of the batch.
    pub fn process_pending<F>(&self, batch: usize, mut executor: F) -> BatchReport
    where
        F: FnMut(&ModelUpdateTask) -> anyhow::Result<()>,
    {
        let batch_ids: Vec<u64> = {
            let tasks = self.tasks.lock().expect("task queue lock poisoned");
            tasks
                .iter()
                .filter(|t| t.status == TaskStatus::Pending)
                .take(batch)
                .map(|t| t.id)
                .collect()
        };

        let mut report = BatchReport::default();
        for id in batch_ids {
            let snapshot = {
                let mut tasks = self.tasks.lock().expect("task queue lock poisoned");
                let task = tasks
                    .iter_mut()
                    .find(|t| t.id == id)
                    .expect("task vanished from append-only queue");
                task.status = TaskStatus::Processing;
                task.started_at = Some(now_ts());
                task.clone()
            };

            let outcome = executor(&snapshot);

            let mut tasks = self.tasks.lock().expect("task queue lock poisoned");
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .expect("task vanished from append-only queue");
            task.completed_at = Some(now_ts());
            match outcome {
                Ok(()) => {
                    task.status = TaskStatus::Completed;
                    report.completed += 1;
                    info!(task_id = id, kind = ?task.kind, "model update task completed");
                }
                Err(e) => {
                    task.status = TaskStatus::Failed;
                    task.error_message = Some(e.to_string());
                    report.failed += 1;
                    error!(task_id = id, error = %e, "model update task failed");
                }
            }
            report.processed += 1;
        }
        report
    }

    /// Reconcile tasks left `Processing` by a crashed process: fail them
    /// with an explanatory message. Returns how many were reconciled.
    pub fn reconcile_startup(&self) -> usize {
        let mut tasks = self.tasks.lock().expect("task queue lock poisoned");
        let mut reconciled = 0;
        for task in tasks.iter_mut() {
            if task.status == TaskStatus::Processing {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(now_ts());
                task.error_message = Some("interrupted by process restart".to_string());
                reconciled += 1;
                warn!(task_id = task.id, "reconciled orphaned processing task");
            }
        }
        reconciled
    }

    pub fn pending_count(&self) -> usize {
        self.tasks
            .lock()
            .expect("task queue lock poisoned")
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count()
    }

    /// Snapshot of the full audit log, oldest first.
    pub fn tasks(&self) -> Vec<ModelUpdateTask> {
        self.tasks.lock().expect("task queue lock poisoned").clone()
    }
}
