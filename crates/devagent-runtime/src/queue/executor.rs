//! Worker pool draining a [`super::TaskQueue`] (spec §4.3.2, §4.3.3).
//!
//! Kernel/runtime split mirrors `mofa-kernel::scheduler::AgentScheduler`:
//! the trait and dispatch loop live here, concrete per-[`TaskType`] behaviour
//! lives in [`super::handlers`].

use crate::error::{RuntimeError, RuntimeResult};
use devagent_kernel::model::{AgentTask, TaskResult, TaskType};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::TaskQueue;

/// One executable behaviour for a [`TaskType`] (spec §4.3.3).
///
/// Implemented once per action type; the kernel has no dependency on any
/// concrete handler, matching the teacher's kernel/foundation split where
/// trait definitions stay generic and implementations live downstream.
#[async_trait::async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, task: &AgentTask) -> RuntimeResult<TaskResult>;
}

/// Maps each [`TaskType`] to its [`ActionHandler`]. Missing entries fall back
/// to an error result rather than panicking — an unregistered type must
/// surface as a failed task, never crash the worker.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, task_type: TaskType, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(task_type, handler);
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&task_type).cloned()
    }
}

/// Drains a [`TaskQueue`] with `concurrency` concurrent workers, dispatching
/// each claimed task to its registered [`ActionHandler`] (spec §4.3.2,
/// §5: `maxConcurrentTasks`).
pub struct Executor {
    queue: TaskQueue,
    registry: Arc<HandlerRegistry>,
    concurrency: usize,
}

impl Executor {
    pub fn new(queue: TaskQueue, registry: HandlerRegistry, concurrency: usize) -> Self {
        Self {
            queue,
            registry: Arc::new(registry),
            concurrency: concurrency.max(1),
        }
    }

    /// Runs one dispatch pass: claims up to `concurrency` ready tasks and
    /// executes them concurrently, retrying retryable failures by
    /// re-queueing rather than duplicate-submitting (spec §4.3.3 step 5).
    /// Returns the number of tasks dispatched this pass.
    pub async fn run_once(&self) -> usize {
        let ready = self.queue.get_ready_tasks(self.concurrency);
        let mut claimed = Vec::with_capacity(ready.len());
        for candidate in ready {
            if let Some(task) = self.queue.try_start_task(&candidate.id) {
                claimed.push(task);
            }
        }
        let dispatched = claimed.len();

        // Each claimed task runs on its own `tokio::spawn`ed task rather than
        // joined in-place: a handler that panics then only fails its own
        // `JoinHandle` (caught below as `Err`), it cannot unwind into this
        // dispatch pass and take every other in-flight task down with it
        // (spec §7's global rule, generalised from caught exceptions to
        // caught panics).
        let handles = claimed.into_iter().map(|task| {
            let queue = self.queue.clone();
            let registry = Arc::clone(&self.registry);
            let task_id = task.id.clone();
            let can_retry = task.can_retry();
            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let outcome = match registry.get(task.task_type) {
                    Some(handler) => handler.execute(&task).await,
                    None => Err(RuntimeError::ActionFailed(format!(
                        "no handler registered for task type {:?}",
                        task.task_type
                    ))),
                };
                match outcome {
                    Ok(mut result) => {
                        result.duration_ms = started.elapsed().as_millis() as u64;
                        queue.complete_task(&task.id, result);
                    }
                    Err(err) => {
                        if task.can_retry() {
                            tracing::warn!(task_id = %task.id, error = %err, "retrying task");
                            queue.requeue(&task.id);
                        } else {
                            queue.mark_task_failed(&task.id, &err.to_string());
                        }
                    }
                }
            });
            (handle, task_id, can_retry)
        });

        for (handle, task_id, can_retry) in handles {
            if let Err(join_err) = handle.await {
                // The handler panicked (or was cancelled) before it could
                // transition the task itself — do it here so the task never
                // lingers in `Running` forever (spec §7's global rule: no
                // worker failure may leave the pipeline stuck).
                tracing::error!(task_id = %task_id, error = %join_err, "task handler panicked");
                if can_retry {
                    self.queue.requeue(&task_id);
                } else {
                    self.queue.mark_task_failed(&task_id, &format!("handler panicked: {join_err}"));
                }
            }
        }
        dispatched
    }

    /// Runs `run_once` in a loop until `shutdown` fires, waking on queue
    /// notifications or the polling interval, whichever comes first (spec
    /// §4.3.2's execution loop, generalised off the teacher's
    /// `tokio::sync::Notify`-based wakeup rather than a busy poll).
    pub async fn run(&self, poll_interval: std::time::Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            self.run_once().await;
            tokio::select! {
                _ = self.queue.notified(poll_interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}
