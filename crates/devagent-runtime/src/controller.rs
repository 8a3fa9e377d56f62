//! Agent Lifecycle Controller (spec §4.1).
//!
//! Owns the process-wide agent: worker pool, [`crate::state::StateManager`]
//! and [`crate::queue::TaskQueue`], plus the background cycle loop that
//! ticks `executionIntervalMs` and drives periodic housekeeping. Mirrors
//! the teacher's `mofa-kernel` split where a single value constructed once
//! in `main` owns every collaborator explicitly — no DI framework, no
//! hidden statics (spec §9 Design Note).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use devagent_kernel::config::AgentSection;
use devagent_kernel::model::{AgentTask, StateValue};
use tokio::sync::{watch, Mutex};

use crate::decision::{DecisionEngine, ErrorAction};
use crate::error::{RuntimeError, RuntimeResult};
use crate::queue::{Executor, HandlerRegistry, TaskQueue};
use crate::state::StateManager;

/// Snapshot returned by [`AgentController::status`].
#[derive(Debug, Clone)]
pub struct AgentStatus {
    pub running: bool,
    pub cycle_count: i64,
    pub total_tasks_executed: i64,
    pub failed_tasks: i64,
    pub pending_tasks: i64,
}

/// Everything [`AgentController::start`] needs beyond the collaborators
/// passed to [`AgentController::new`].
pub struct ControllerConfig {
    pub max_concurrent_tasks: usize,
    pub execution_interval: Duration,
    pub shutdown_timeout: Duration,
    pub persist_state_every_n_cycles: u64,
    pub executor_poll_interval: Duration,
}

impl From<&AgentSection> for ControllerConfig {
    fn from(section: &AgentSection) -> Self {
        Self {
            max_concurrent_tasks: section.max_concurrent_tasks,
            execution_interval: section.execution_interval(),
            shutdown_timeout: section.shutdown_timeout(),
            persist_state_every_n_cycles: 50,
            executor_poll_interval: Duration::from_millis(500),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            execution_interval: Duration::from_millis(1_000),
            shutdown_timeout: Duration::from_secs(30),
            persist_state_every_n_cycles: 50,
            executor_poll_interval: Duration::from_millis(500),
        }
    }
}

struct RunningHandles {
    cycle_loop: tokio::task::JoinHandle<()>,
    executor_loop: tokio::task::JoinHandle<()>,
    backup_scheduler: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

/// The process-wide agent singleton (spec §4.1). Constructed once with its
/// collaborators (task queue, state manager, decision engine); `start`/
/// `stop` are plain async methods, not framework-managed lifecycle hooks.
pub struct AgentController {
    config: ControllerConfig,
    queue: TaskQueue,
    state: StateManager,
    decision: Arc<DecisionEngine>,
    handlers: HandlerRegistry,
    running: AtomicBool,
    handles: Mutex<Option<RunningHandles>>,
}

impl AgentController {
    pub fn new(
        config: ControllerConfig,
        queue: TaskQueue,
        state: StateManager,
        decision: Arc<DecisionEngine>,
        handlers: HandlerRegistry,
    ) -> Self {
        Self {
            config,
            queue,
            state,
            decision,
            handlers,
            running: AtomicBool::new(false),
            handles: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn submit(&self, task: AgentTask) -> String {
        self.queue.submit(task)
    }

    /// `cycle_count`/`total_tasks_executed`/`failed_tasks` come from the
    /// [`StateManager`] (spec §3: `total_tasks_executed` is monotone
    /// non-decreasing across process lifetimes, restored from snapshot);
    /// `pending_tasks` comes live from the queue since it is never
    /// meaningfully restorable across a restart.
    pub async fn status(&self) -> AgentStatus {
        let stats = self.queue.get_statistics();
        let cycle_count = self
            .state
            .get_state("cycle_count")
            .await
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let total_tasks_executed = self
            .state
            .get_state("total_tasks_executed")
            .await
            .and_then(|v| v.as_i64())
            .unwrap_or(stats.completed_tasks as i64);
        let failed_tasks = self
            .state
            .get_state("failed_tasks")
            .await
            .and_then(|v| v.as_i64())
            .unwrap_or(stats.failed_tasks as i64);
        AgentStatus {
            running: self.is_running(),
            cycle_count,
            total_tasks_executed,
            failed_tasks,
            pending_tasks: stats.pending_tasks as i64,
        }
    }

    /// Startup sequence (spec §4.1): idempotent, under an internal mutex.
    /// Fatal if the worker pool or state manager cannot initialise — the
    /// caller sees a [`RuntimeError::Startup`] and nothing is left running.
    pub async fn start(&self) -> RuntimeResult<()> {
        let mut handles = self.handles.lock().await;
        if handles.is_some() || self.is_running() {
            return Ok(());
        }

        if self.config.max_concurrent_tasks == 0 {
            return Err(RuntimeError::Startup(
                "max_concurrent_tasks must be at least 1".to_string(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let executor = Executor::new(self.queue.clone(), self.handlers.clone(), self.config.max_concurrent_tasks);
        let executor_poll_interval = self.config.executor_poll_interval;
        let executor_shutdown_rx = shutdown_rx.clone();
        let executor_loop = tokio::spawn(async move {
            executor.run(executor_poll_interval, executor_shutdown_rx).await;
        });

        let backup_scheduler = None; // caller may attach its own via `state.spawn_backup_scheduler`

        let cycle_loop = self.spawn_cycle_loop(shutdown_rx);

        *handles = Some(RunningHandles {
            cycle_loop,
            executor_loop,
            backup_scheduler,
            shutdown_tx,
        });
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// The main cycle loop (spec §4.1): updates `last_activity`, runs
    /// queue cleanup, records statistics, periodically snapshots state,
    /// then sleeps `executionIntervalMs`. Any caught error is routed
    /// through the Decision Engine's retry/stop verdict; a Decision Engine
    /// failure itself falls back to a fixed 5s sleep.
    fn spawn_cycle_loop(&self, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let queue = self.queue.clone();
        let state = self.state.clone();
        let decision = Arc::clone(&self.decision);
        let interval = self.config.execution_interval;
        let persist_every = self.config.persist_state_every_n_cycles;
        let cycle_count_for_loop = Arc::new(std::sync::atomic::AtomicU64::new(0));
        // Cumulative queue counters reset to zero every process lifetime, so
        // only the delta since the previous tick is added to the
        // monotone-across-restarts `total_tasks_executed`/`failed_tasks`
        // counters the StateManager owns.
        let mut last_completed_ever: u64 = 0;
        let mut last_failed_ever: u64 = 0;

        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    return;
                }

                let outcome: RuntimeResult<()> = async {
                    state
                        .set_state("last_activity", StateValue::from(chrono::Utc::now().to_rfc3339()))
                        .await;

                    queue.cleanup_completed_tasks();

                    let stats = queue.get_statistics();

                    // Advisory per-cycle housekeeping (spec §4.1): the
                    // Decision Engine gets a summary of queue pressure and
                    // may recommend a strategy, but nothing here acts on
                    // the recommendation — it is logged for visibility
                    // only, never substituted for the fixed scheduling
                    // discipline in §4.3.2.
                    let situation = format!(
                        "{} pending, {} running, {} failed",
                        stats.pending_tasks, stats.running_tasks, stats.failed_tasks
                    );
                    let recommendation = decision.decide_strategy(&situation, "routine cycle housekeeping").await;
                    tracing::debug!(
                        strategy = ?recommendation.strategy,
                        priority = %recommendation.priority,
                        "decision engine housekeeping recommendation"
                    );

                    let completed_delta = stats.total_completed_ever.saturating_sub(last_completed_ever);
                    let failed_delta = stats.total_failed_ever.saturating_sub(last_failed_ever);
                    last_completed_ever = stats.total_completed_ever;
                    last_failed_ever = stats.total_failed_ever;
                    state
                        .record_cycle(completed_delta as i64, failed_delta as i64, stats.pending_tasks as i64)
                        .await;

                    let n = cycle_count_for_loop.fetch_add(1, Ordering::SeqCst) + 1;
                    if persist_every > 0 && n % persist_every == 0 {
                        state.save_state().await.map_err(|e| {
                            tracing::warn!(error = %e, "periodic state snapshot failed");
                            e
                        }).ok();
                    }
                    Ok(())
                }
                .await;

                if let Err(err) = outcome {
                    let verdict = decision.handle_error(&err.to_string(), "cycle loop").await;
                    match verdict.action {
                        ErrorAction::Stop => return,
                        ErrorAction::Retry | ErrorAction::Skip | ErrorAction::Escalate => {
                            tokio::time::sleep(Duration::from_millis(verdict.retry_delay_ms)).await;
                            continue;
                        }
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        })
    }

    /// Shutdown sequence (spec §4.1): always best-effort. Signals the
    /// cycle loop and executor, awaits drain up to `shutdownTimeout`, then
    /// lets the remaining in-flight futures be dropped (forcibly
    /// cancelled) and does a final state save regardless of drain outcome.
    pub async fn stop(&self) {
        let mut handles = self.handles.lock().await;
        let Some(running) = handles.take() else {
            return;
        };

        let _ = running.shutdown_tx.send(true);

        let cycle_abort = running.cycle_loop.abort_handle();
        let executor_abort = running.executor_loop.abort_handle();
        let drain = futures::future::join(running.cycle_loop, running.executor_loop);
        if tokio::time::timeout(self.config.shutdown_timeout, drain).await.is_err() {
            tracing::warn!("shutdown drain exceeded timeout; remaining workers force-cancelled");
            cycle_abort.abort();
            executor_abort.abort();
        }
        // Whether or not the drain completed cleanly, cancel every queue
        // entry the worker pool never got to (spec §5: "in-flight tasks
        // may complete up to shutdownTimeout, after which they are
        // forcibly cancelled").
        let cancelled = self.queue.cancel_all_unfinished();
        if cancelled > 0 {
            tracing::info!(count = cancelled, "cancelled unfinished tasks on shutdown");
        }
        if let Some(backup) = running.backup_scheduler {
            backup.abort();
        }

        self.state.shutdown().await;
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devagent_kernel::llm::test_support::ScriptedLlmClient;
    use std::sync::Arc as StdArc;

    fn decision_engine() -> Arc<DecisionEngine> {
        Arc::new(DecisionEngine::new(
            StdArc::new(ScriptedLlmClient::new(vec![])),
            Duration::from_secs(1),
        ))
    }

    #[tokio::test]
    async fn start_then_stop_is_idempotent_and_toggles_running() {
        let controller = AgentController::new(
            ControllerConfig {
                execution_interval: Duration::from_millis(20),
                ..Default::default()
            },
            TaskQueue::new(),
            StateManager::init("agent-1", None, 1000, 100).await,
            decision_engine(),
            HandlerRegistry::new(),
        );

        assert!(!controller.is_running());
        controller.start().await.unwrap();
        assert!(controller.is_running());
        controller.start().await.unwrap(); // no-op, already running
        assert!(controller.is_running());

        controller.stop().await;
        assert!(!controller.is_running());
        controller.stop().await; // idempotent
    }

    #[tokio::test]
    async fn zero_concurrency_is_a_fatal_startup_error() {
        let controller = AgentController::new(
            ControllerConfig {
                max_concurrent_tasks: 0,
                ..Default::default()
            },
            TaskQueue::new(),
            StateManager::init("agent-1", None, 1000, 100).await,
            decision_engine(),
            HandlerRegistry::new(),
        );
        assert!(controller.start().await.is_err());
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn cycle_loop_advances_cycle_count_and_saves_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = StateManager::init("agent-1", Some(path.clone()), 1000, 100).await;

        let controller = AgentController::new(
            ControllerConfig {
                execution_interval: Duration::from_millis(5),
                persist_state_every_n_cycles: 1,
                ..Default::default()
            },
            TaskQueue::new(),
            state,
            decision_engine(),
            HandlerRegistry::new(),
        );

        controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        controller.stop().await;

        let status = controller.status().await;
        assert!(status.cycle_count >= 1);
        assert!(tokio::fs::metadata(&path).await.is_ok());
    }

    /// `total_tasks_executed` must keep climbing even though the cycle
    /// loop purges `Completed` tasks from the live queue every tick —
    /// regression guard for the cleanup-before-stats ordering bug (spec
    /// §3: "`AgentState.total_tasks_executed` is monotone non-decreasing").
    #[tokio::test]
    async fn total_tasks_executed_survives_queue_cleanup() {
        let queue = TaskQueue::new();
        let controller = AgentController::new(
            ControllerConfig {
                execution_interval: Duration::from_millis(5),
                ..Default::default()
            },
            queue.clone(),
            StateManager::init("agent-1", None, 1000, 100).await,
            decision_engine(),
            HandlerRegistry::new(),
        );

        let id = queue.submit(AgentTask::new(
            "t",
            devagent_kernel::model::TaskType::AiAnalysis,
            "d",
        ));
        queue.get_ready_tasks(10);
        queue.try_start_task(&id);
        queue.complete_task(&id, devagent_kernel::model::TaskResult::success("ok", 1));

        controller.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        controller.stop().await;

        let status = controller.status().await;
        assert_eq!(status.total_tasks_executed, 1);
    }

    #[tokio::test]
    async fn submitted_task_is_visible_via_status() {
        let queue = TaskQueue::new();
        let controller = AgentController::new(
            ControllerConfig::default(),
            queue.clone(),
            StateManager::init("agent-1", None, 1000, 100).await,
            decision_engine(),
            HandlerRegistry::new(),
        );
        let id = controller.submit(AgentTask::new(
            "t",
            devagent_kernel::model::TaskType::AiAnalysis,
            "d",
        ));
        assert!(queue.get_task(&id).is_some());
        let status = controller.status().await;
        assert_eq!(status.pending_tasks, 1);
    }
}
