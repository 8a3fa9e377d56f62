//! End-to-end scenarios (spec §8) driving the full `Planner` → `TaskQueue`
//! → `Executor` stack together, rather than each component in isolation.

use std::sync::Arc;
use std::time::Duration;

use devagent_kernel::llm::test_support::ScriptedLlmClient;
use devagent_kernel::llm::LlmClient;
use devagent_kernel::model::{
    AgentTask, Goal, PlanExecutionStatus, PlanStatus, StepStatus, TaskPriority, TaskStatus, TaskType,
};
use devagent_runtime::queue::ShellCommandHandler;
use devagent_runtime::{
    default_handler_registry, AgentController, AutoBackend, ControllerConfig, DecisionEngine,
    HandlerRegistry, Planner, PlannerConfig, StateManager, TaskQueue,
};

fn planner(llm: Arc<dyn LlmClient>, working_dir: std::path::PathBuf) -> (Planner, TaskQueue) {
    let queue = TaskQueue::new();
    let planner = Planner::new(
        Arc::clone(&llm),
        queue.clone(),
        PlannerConfig {
            working_dir,
            llm_timeout: Duration::from_secs(5),
            task_wait_timeout: Duration::from_secs(5),
            ..Default::default()
        },
        Arc::new(AutoBackend),
    );
    (planner, queue)
}

/// Scenario 1: write, read, then delete `hello.txt` — three subtasks, each
/// reflected as `YES`, ending with an empty working directory and a
/// `Completed` plan.
#[tokio::test]
async fn write_read_delete_cycle_completes_and_leaves_no_file_behind() {
    let dir = tempfile::tempdir().unwrap();

    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![
        // phase 1-3 of create_plan
        "SUBTASK_1:\nDescription: write hello.txt\nExpected Outcome: file exists\nPriority: HIGH\n\n\
         SUBTASK_2:\nDescription: read hello.txt\nExpected Outcome: content retrieved\nPriority: MEDIUM\n\n\
         SUBTASK_3:\nDescription: delete hello.txt\nExpected Outcome: file removed\nPriority: MEDIUM\n",
        "Execution Order: SUBTASK_1, SUBTASK_2, SUBTASK_3",
        // subtask 1: write
        "writing the file is the first step",
        "ACTION_TYPE: FILE_WRITE\nACTION_DESCRIPTION: write hello.txt\nPARAMETERS: file_path=hello.txt, content=hello world\nEXPECTED_OUTCOME: file exists",
        "the file was written successfully",
        "YES, the file exists now",
        // subtask 2: read
        "reading the file back confirms its contents",
        "ACTION_TYPE: FILE_READ\nACTION_DESCRIPTION: read hello.txt\nPARAMETERS: file_path=hello.txt\nEXPECTED_OUTCOME: content retrieved",
        "the file contains hello world",
        "YES, content matches",
        // subtask 3: delete
        "cleanup means removing the file",
        "ACTION_TYPE: FILE_DELETE\nACTION_DESCRIPTION: delete hello.txt\nPARAMETERS: file_path=hello.txt\nEXPECTED_OUTCOME: file removed",
        "the file no longer exists",
        "YES, file removed",
    ]));

    let registry = default_handler_registry(
        Arc::clone(&llm),
        Duration::from_secs(5),
        1 << 20,
        dir.path().to_path_buf(),
    );
    let (planner, _queue) = planner(Arc::clone(&llm), dir.path().to_path_buf());
    let executor = planner.spawn_executor(registry, 4);

    let plan = planner.create_plan(&Goal::new("create then remove a scratch file")).await;
    assert_eq!(plan.subtasks.len(), 3);

    let execution = planner.execute_plan(&plan.id).await.expect("plan exists");
    executor.abort();

    assert_eq!(execution.status, PlanExecutionStatus::Completed);
    assert_eq!(execution.steps.len(), 3);
    assert!(execution.steps.iter().all(|s| s.status == StepStatus::Completed));
    assert_eq!(execution.current_step_index, 3);

    let finished_plan = planner.get_plan(&plan.id).await.unwrap();
    assert_eq!(finished_plan.status, PlanStatus::Completed);

    assert!(!dir.path().join("hello.txt").exists());
}

/// Scenario 2: a single `CRITICAL` subtask whose shell command exits
/// non-zero. `AutoBackend` stops on a critical failure, so the plan ends
/// `Failed` with one step carrying the non-zero exit code.
#[tokio::test]
async fn critical_subtask_failure_stops_the_plan() {
    let dir = tempfile::tempdir().unwrap();

    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![
        "SUBTASK_1:\nDescription: run a failing command\nExpected Outcome: command succeeds\nPriority: CRITICAL\n",
        "Execution Order: SUBTASK_1",
        "this subtask must run a shell command",
        "ACTION_TYPE: SHELL_COMMAND\nACTION_DESCRIPTION: run a failing command\nPARAMETERS: command=exit 1\nEXPECTED_OUTCOME: command succeeds",
        "the command exited with a non-zero status",
        "NO, the command failed",
    ]));

    let registry = default_handler_registry(
        Arc::clone(&llm),
        Duration::from_secs(5),
        1 << 20,
        dir.path().to_path_buf(),
    );
    let (planner, _queue) = planner(Arc::clone(&llm), dir.path().to_path_buf());
    let executor = planner.spawn_executor(registry, 4);

    let plan = planner.create_plan(&Goal::new("run a command that fails")).await;
    assert_eq!(plan.subtasks.len(), 1);
    assert!(plan.subtasks[0].is_critical());

    let execution = planner.execute_plan(&plan.id).await.expect("plan exists");
    executor.abort();

    assert_eq!(execution.status, PlanExecutionStatus::Failed);
    assert_eq!(execution.steps.len(), 1);
    assert_eq!(execution.steps[0].status, StepStatus::Failed);
    assert!(execution.steps[0]
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains('1')));

    let finished_plan = planner.get_plan(&plan.id).await.unwrap();
    assert_eq!(finished_plan.status, PlanStatus::Failed);
}

/// Scenario 6: graceful shutdown under load. Ten long-running shell tasks
/// are submitted against a controller limited to two concurrent slots; a
/// short `shutdown_timeout` forces `stop()` to cancel whatever is still
/// `Pending`/`Ready`/`Running` rather than wait out the full sleep.
#[tokio::test]
async fn graceful_shutdown_cancels_tasks_still_in_flight() {
    let queue = TaskQueue::new();
    let mut handlers = HandlerRegistry::new();
    handlers.register(
        TaskType::ShellCommand,
        Arc::new(ShellCommandHandler { timeout: Duration::from_secs(5) }),
    );
    let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(Vec::<&str>::new()));
    let decision = Arc::new(DecisionEngine::new(llm, Duration::from_secs(5)));
    let state = StateManager::init("shutdown-scenario", None, 100, 10).await;

    let controller = AgentController::new(
        ControllerConfig {
            max_concurrent_tasks: 2,
            execution_interval: Duration::from_millis(20),
            shutdown_timeout: Duration::from_millis(300),
            persist_state_every_n_cycles: 0,
            executor_poll_interval: Duration::from_millis(20),
        },
        queue.clone(),
        state,
        decision,
        handlers,
    );

    let task_ids: Vec<String> = (0..10)
        .map(|i| {
            controller.submit(
                AgentTask::new(format!("sleeper-{i}"), TaskType::ShellCommand, "sleep under load")
                    .with_parameter("command", "sleep 5")
                    .with_priority(TaskPriority::Medium),
            )
        })
        .collect();

    controller.start().await.expect("controller starts");
    tokio::time::sleep(Duration::from_millis(150)).await;

    let stop_started = std::time::Instant::now();
    controller.stop().await;
    let stop_elapsed = stop_started.elapsed();

    assert!(
        stop_elapsed < Duration::from_secs(2),
        "stop() should drain within its shutdown_timeout, took {stop_elapsed:?}"
    );

    let statuses: Vec<TaskStatus> = task_ids
        .iter()
        .map(|id| queue.get_task(id).expect("task recorded").status)
        .collect();
    let completed = statuses.iter().filter(|s| **s == TaskStatus::Completed).count();
    let cancelled = statuses.iter().filter(|s| **s == TaskStatus::Cancelled).count();

    assert!(completed <= 2, "at most maxConcurrentTasks should finish, got {completed}");
    assert_eq!(
        completed + cancelled,
        10,
        "every task should end up completed or cancelled, got {statuses:?}"
    );
}
