//! Task Queue & Executor (spec §4.3).
//!
//! The queue itself is plain, lock-protected data (no tokio runtime
//! required to exercise its scheduling discipline in isolation); the
//! worker pool that drains it lives in [`executor`] and is where the
//! bounded concurrency (spec §5) and per-type dispatch actually happen.

mod executor;
mod handlers;

pub use executor::{ActionHandler, Executor, HandlerRegistry};
pub use handlers::{
    AiAnalysisHandler, CodeGenerationHandler, FileCopyHandler, FileDeleteHandler, FileReadHandler,
    FileWriteHandler, McpToolCallHandler, ShellCommandHandler,
};

use devagent_kernel::model::{AgentTask, TaskPriority, TaskResult, TaskStatus, TaskType};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QueueError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("invalid transition for task {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Snapshot returned by [`TaskQueue::get_statistics`] (spec §4.3.1).
#[derive(Debug, Clone, Default)]
pub struct QueueStatistics {
    pub total_tasks: u64,
    pub queued_tasks: u64,
    pub running_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub pending_tasks: u64,
    /// Cumulative count of tasks that have ever reached `Completed`,
    /// unaffected by [`TaskQueue::cleanup_completed_tasks`] purging them
    /// from the live table (spec §4.3.1: "keeps counters
    /// (`totalCompletedEver`) intact").
    pub total_completed_ever: u64,
    /// Cumulative count of tasks that have ever reached `Failed`.
    pub total_failed_ever: u64,
    pub status_counts: HashMap<String, u64>,
}

struct Inner {
    tasks: HashMap<String, AgentTask>,
    total_completed_ever: u64,
    total_failed_ever: u64,
}

/// A priority-then-FIFO, dependency-gated queue of [`AgentTask`]s.
///
/// Mirrors the teacher's `EventQueue` (`Arc<Mutex<VecDeque<_>>>` guarded by
/// a `tokio::sync::Notify`), generalised from a single backpressure
/// strategy to dependency-aware promotion and multi-level priority
/// ordering.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    cleanup_retention: Arc<AtomicU64>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                tasks: HashMap::new(),
                total_completed_ever: 0,
                total_failed_ever: 0,
            })),
            notify: Arc::new(Notify::new()),
            cleanup_retention: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Inserts `task`, assigning a fresh id if the caller left one blank.
    /// O(1) hash-map insertion (spec's stated O(log N) bound is satisfied
    /// trivially).
    pub fn submit(&self, mut task: AgentTask) -> String {
        if task.id.is_empty() {
            task.id = uuid::Uuid::new_v4().to_string();
        }
        task.status = TaskStatus::Pending;
        let id = task.id.clone();
        let mut inner = self.inner.lock().unwrap();
        inner.tasks.insert(id.clone(), task);
        drop(inner);
        self.notify.notify_waiters();
        id
    }

    pub fn get_task(&self, id: &str) -> Option<AgentTask> {
        self.inner.lock().unwrap().tasks.get(id).cloned()
    }

    /// Promotes every `Pending` task whose dependencies are all
    /// `Completed` to `Ready`, then returns up to `limit` `Ready` tasks
    /// ordered by priority then `created_at` (spec §4.3.1, §4.3.2).
    pub fn get_ready_tasks(&self, limit: usize) -> Vec<AgentTask> {
        let mut inner = self.inner.lock().unwrap();

        let completed_ids: std::collections::HashSet<String> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id.clone())
            .collect();

        let to_promote: Vec<String> = inner
            .tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Pending
                    && t.dependencies.iter().all(|d| completed_ids.contains(d))
            })
            .map(|t| t.id.clone())
            .collect();
        for id in to_promote {
            if let Some(t) = inner.tasks.get_mut(&id) {
                t.status = TaskStatus::Ready;
            }
        }

        let mut ready: Vec<AgentTask> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Ready)
            .cloned()
            .collect();
        ready.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        ready.truncate(limit);
        ready
    }

    /// Atomically claims a `Ready` task for execution, transitioning it to
    /// `Running`. Returns `None` if another worker already claimed it or it
    /// is no longer `Ready` — this is what makes dispatch at-most-once
    /// (spec §4.3.2) despite multiple workers racing the same ready set.
    pub fn try_start_task(&self, id: &str) -> Option<AgentTask> {
        let mut inner = self.inner.lock().unwrap();
        let task = inner.tasks.get_mut(id)?;
        if task.status != TaskStatus::Ready {
            return None;
        }
        task.status = TaskStatus::Running;
        task.started_at = Some(chrono::Utc::now());
        Some(task.clone())
    }

    pub fn complete_task(&self, id: &str, result: TaskResult) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.get_mut(id) {
            task.status = TaskStatus::Completed;
            task.completed_at = Some(chrono::Utc::now());
            task.result = Some(result);
        }
        inner.total_completed_ever += 1;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Marks `id` failed. If it can still be retried (spec §4.3.3 step 5)
    /// the caller is expected to re-queue via [`TaskQueue::requeue`] rather
    /// than calling this for a terminal failure.
    pub fn mark_task_failed(&self, id: &str, reason: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.get_mut(id) {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(chrono::Utc::now());
            task.error_message = Some(reason.to_string());
        }
        inner.total_failed_ever += 1;
        drop(inner);
        self.notify.notify_waiters();
    }

    pub fn cancel_task(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.get_mut(id) {
            if matches!(task.status, TaskStatus::Pending | TaskStatus::Ready | TaskStatus::Running) {
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(chrono::Utc::now());
            }
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Cancels every task still `Pending`, `Ready`, or `Running`. Backs the
    /// Lifecycle Controller's shutdown sequence (spec §4.1, §5): in-flight
    /// tasks the worker pool could not drain within `shutdownTimeout` are
    /// force-cancelled rather than left dangling.
    pub fn cancel_all_unfinished(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let ids: Vec<String> = inner
            .tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Ready | TaskStatus::Running))
            .map(|t| t.id.clone())
            .collect();
        for id in &ids {
            if let Some(task) = inner.tasks.get_mut(id) {
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(chrono::Utc::now());
            }
        }
        drop(inner);
        if !ids.is_empty() {
            self.notify.notify_waiters();
        }
        ids.len()
    }

    /// Re-queues a failed, retryable task back to `Pending` and bumps its
    /// retry counter (spec §4.3.3 step 5: "retries are handled by the
    /// executor by re-queueing ... never by duplicate submit").
    pub fn requeue(&self, id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(task) = inner.tasks.get_mut(id) {
            task.retry_count += 1;
            task.status = TaskStatus::Pending;
            task.started_at = None;
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Removes `Completed` tasks from the live table; their contribution
    /// to `total_completed_ever` (surfaced via statistics) is preserved.
    pub fn cleanup_completed_tasks(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.tasks.retain(|_, t| t.status != TaskStatus::Completed);
    }

    pub fn get_statistics(&self) -> QueueStatistics {
        let inner = self.inner.lock().unwrap();
        let mut status_counts: HashMap<String, u64> = HashMap::new();
        let mut stats = QueueStatistics {
            total_tasks: inner.tasks.len() as u64,
            total_completed_ever: inner.total_completed_ever,
            total_failed_ever: inner.total_failed_ever,
            ..Default::default()
        };
        for task in inner.tasks.values() {
            *status_counts.entry(format!("{:?}", task.status)).or_insert(0) += 1;
            match task.status {
                TaskStatus::Pending => stats.pending_tasks += 1,
                TaskStatus::Ready => stats.queued_tasks += 1,
                TaskStatus::Running => stats.running_tasks += 1,
                TaskStatus::Completed => stats.completed_tasks += 1,
                TaskStatus::Failed => stats.failed_tasks += 1,
                TaskStatus::Cancelled => {}
            }
        }
        stats.status_counts = status_counts;
        stats
    }

    /// Waits until either a task transition occurred or `timeout` elapses.
    /// Backs the Planner's subtask-completion wait (spec §5) so the 1s/60s
    /// poll budget in the spec becomes a timeout bound on a
    /// completion-notification primitive rather than a busy loop.
    pub async fn notified(&self, timeout: std::time::Duration) {
        let notified = self.notify.notified();
        let _ = tokio::time::timeout(timeout, notified).await;
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
