//! Planning / ReAct Engine (spec §4.2): creates a [`Plan`] from a goal and
//! drives it to completion, subtask by subtask.

mod action_parser;
mod context_probe;
mod decomposition;
pub mod interaction;
mod react;

pub use context_probe::ContextProbe;
pub use interaction::{AutoBackend, FailureChoice, FailureReport, InteractionBackend, TtyBackend};

use devagent_kernel::llm::LlmClient;
use devagent_kernel::model::{
    Goal, Plan, PlanExecution, PlanExecutionStatus, PlanStatus, SubTaskStatus,
};
use devagent_kernel::tools::KNOWN_TOOLS;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::fs_safety::{self, WriteMode};
use crate::queue::{Executor, HandlerRegistry, TaskQueue};
use devagent_kernel::model::{AgentTask, TaskPriority, TaskType};

/// Configuration the Planner needs beyond the LLM client itself.
pub struct PlannerConfig {
    pub working_dir: PathBuf,
    pub context_probe_max_depth: usize,
    pub llm_timeout: Duration,
    pub task_wait_timeout: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            context_probe_max_depth: 3,
            llm_timeout: Duration::from_secs(60),
            task_wait_timeout: Duration::from_secs(60),
        }
    }
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    queue: TaskQueue,
    config: PlannerConfig,
    interaction: Arc<dyn InteractionBackend>,
    plans: RwLock<HashMap<String, Plan>>,
}

impl Planner {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        queue: TaskQueue,
        config: PlannerConfig,
        interaction: Arc<dyn InteractionBackend>,
    ) -> Self {
        Self {
            llm,
            queue,
            config,
            interaction,
            plans: RwLock::new(HashMap::new()),
        }
    }

    /// Spawns the executor worker loop backing this planner's `queue`;
    /// callers own the returned handle and abort it on shutdown.
    pub fn spawn_executor(&self, registry: HandlerRegistry, concurrency: usize) -> tokio::task::JoinHandle<()> {
        let executor = Executor::new(self.queue.clone(), registry, concurrency);
        let poll_interval = Duration::from_millis(500);
        tokio::spawn(async move {
            let (_tx, rx) = tokio::sync::watch::channel(false);
            executor.run(poll_interval, rx).await;
        })
    }

    /// Phase 1-3 of plan creation (spec §4.2.1).
    pub async fn create_plan(&self, goal: &Goal) -> Plan {
        let (project_type, project_name, source_file_counts) =
            context_probe::probe_working_directory(&self.config.working_dir, self.config.context_probe_max_depth);
        let referenced_files = context_probe::extract_referenced_files(&goal.text);
        let available_tools = context_probe::probe_available_tools(KNOWN_TOOLS).await;

        let probe = ContextProbe {
            project_type,
            project_name,
            source_file_counts,
            referenced_files,
            available_tools,
        };

        let decomposition_prompt = format!(
            "Goal: {}\nContext: {:?}\nProbe:\n{}\nProduce subtasks as SUBTASK_1:, SUBTASK_2:, … each with Description, Expected Outcome, Priority, Complexity, Dependencies, Commands, Code Language, Code Content, File Path, File Content.",
            goal.text,
            goal.context,
            probe.to_prompt_block()
        );
        let decomposition_reply = self
            .llm
            .send(&decomposition_prompt, self.config.llm_timeout)
            .await
            .unwrap_or_default();
        let subtasks = decomposition::parse_decomposition(&decomposition_reply);

        let strategy_prompt = format!(
            "Goal: {}\nSubtasks: {}\nDescribe execution order and risk mitigations.",
            goal.text,
            subtasks.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ")
        );
        let strategy_reply = self
            .llm
            .send(&strategy_prompt, self.config.llm_timeout)
            .await
            .unwrap_or_default();
        let strategy = decomposition::parse_strategy(&strategy_reply);

        let mut plan = Plan::new(goal.text.clone(), subtasks, strategy);
        plan.context = goal.context.clone();
        plan.available_tools = probe.available_tools;
        self.plans.write().await.insert(plan.id.clone(), plan.clone());
        plan
    }

    pub async fn get_plan(&self, plan_id: &str) -> Option<Plan> {
        self.plans.read().await.get(plan_id).cloned()
    }

    /// Every plan not yet in a terminal status (spec §6: `getActivePlans()`).
    pub async fn get_active_plans(&self) -> Vec<Plan> {
        self.plans
            .read()
            .await
            .values()
            .filter(|p| matches!(p.status, PlanStatus::Created | PlanStatus::Executing))
            .cloned()
            .collect()
    }

    /// Marks `plan_id` `Cancelled` if it exists and is not already
    /// terminal (spec §6: `cancelPlan(id)`). Does not interrupt an
    /// in-progress [`Planner::execute_plan`] call already running for this
    /// plan — cancellation is observed as a status flag, matching
    /// `Plan`'s "immutable after creation except for `status`" invariant
    /// (spec §3).
    pub async fn cancel_plan(&self, plan_id: &str) -> bool {
        let mut plans = self.plans.write().await;
        let Some(plan) = plans.get_mut(plan_id) else {
            return false;
        };
        if matches!(plan.status, PlanStatus::Completed | PlanStatus::Failed | PlanStatus::Cancelled) {
            return false;
        }
        plan.status = PlanStatus::Cancelled;
        true
    }

    /// Drives every subtask of `plan_id` in order (spec §4.2.2).
    pub async fn execute_plan(&self, plan_id: &str) -> Option<PlanExecution> {
        let mut plan = self.plans.write().await.get(plan_id)?.clone();
        plan.status = PlanStatus::Executing;
        let mut execution = PlanExecution::new(plan_id.to_string());
        let mut working_memory: HashMap<String, String> = HashMap::new();

        for subtask in plan.subtasks.iter_mut() {
            subtask.status = SubTaskStatus::Running;
            subtask.started_at = Some(chrono::Utc::now());

            self.check_tool_availability(subtask, &mut working_memory).await;

            if let Err(failure) = self.run_directive_phase(subtask).await {
                execution.failure_reason = Some(failure);
            }

            let outcome = react::run_cycle(
                &self.llm,
                &self.queue,
                &plan.goal,
                subtask,
                &working_memory,
                &execution.steps,
                &plan.available_tools,
                self.config.llm_timeout,
                self.config.task_wait_timeout,
            )
            .await;

            for (key, value) in &outcome.memory_updates {
                working_memory.insert(key.clone(), value.clone());
            }

            let succeeded = outcome.success;
            let exit_code = outcome.task_result.as_ref().and_then(|r| r.exit_code);
            execution.steps.push(outcome.step);
            execution.current_step_index += 1;

            if succeeded {
                subtask.status = SubTaskStatus::Completed;
                subtask.completed_at = Some(chrono::Utc::now());
                continue;
            }

            subtask.status = SubTaskStatus::Failed;

            let report = FailureReport::from_step(
                subtask,
                execution.steps.last().unwrap(),
                exit_code,
                execution.steps.last().unwrap().observation.as_str(),
            );
            let choice = self.interaction.ask(&report, subtask.is_critical()).await;

            match choice {
                FailureChoice::Continue => continue,
                FailureChoice::Stop => {
                    execution.status = PlanExecutionStatus::Failed;
                    execution.completed_at = Some(chrono::Utc::now());
                    plan.status = PlanStatus::Failed;
                    self.plans.write().await.insert(plan.id.clone(), plan);
                    return Some(execution);
                }
                FailureChoice::Retry => {
                    subtask.status = SubTaskStatus::Pending;
                }
            }

            if subtask.is_critical() {
                let replan_prompt = format!(
                    "A CRITICAL subtask failed: {}. Suggest a revised approach.",
                    subtask.description
                );
                let suggestion = self
                    .llm
                    .send(&replan_prompt, self.config.llm_timeout)
                    .await
                    .unwrap_or_default();
                tracing::info!(subtask = %subtask.id, suggestion = %suggestion, "replanning suggestion logged");
            }
        }

        execution.status = PlanExecutionStatus::Completed;
        execution.completed_at = Some(chrono::Utc::now());
        plan.status = PlanStatus::Completed;
        self.plans.write().await.insert(plan.id.clone(), plan);
        Some(execution)
    }

    /// Tool-availability check (spec §4.2.2 step 1): for each of this
    /// subtask's commands, extract the base executable and probe for it;
    /// an unavailable tool gets an install-command suggestion from the LLM
    /// recorded in `workingMemory` rather than any attempt to auto-install.
    async fn check_tool_availability(
        &self,
        subtask: &devagent_kernel::model::SubTask,
        working_memory: &mut HashMap<String, String>,
    ) {
        for command in &subtask.commands {
            let Some(executable) = context_probe::extract_base_executable(command) else {
                continue;
            };
            let found = context_probe::probe_available_tools(&[executable.as_str()]).await;
            if found.is_empty() {
                let prompt = format!(
                    "The command '{command}' needs '{executable}', which is not available on this system. Suggest OS-specific installation commands."
                );
                let suggestion = self
                    .llm
                    .send(&prompt, self.config.llm_timeout)
                    .await
                    .unwrap_or_default();
                working_memory.insert(format!("install_{executable}"), suggestion);
            }
        }
    }

    /// Executes a subtask's inline directives before its ReAct cycle (spec
    /// §4.2.2 step 2, §4.2.4).
    async fn run_directive_phase(&self, subtask: &mut devagent_kernel::model::SubTask) -> Result<(), String> {
        if !subtask.has_directive() {
            return Ok(());
        }

        if let (Some(file_path), Some(file_content)) = (subtask.file_path.clone(), subtask.file_content.clone()) {
            let path = fs_safety::sanitize_path(&file_path, &subtask.description, &self.config.working_dir);
            let mode = match subtask.file_operation_mode {
                devagent_kernel::model::FileOperationMode::Create => WriteMode::Create,
                devagent_kernel::model::FileOperationMode::Append => WriteMode::Append,
                devagent_kernel::model::FileOperationMode::Replace => WriteMode::Replace,
                devagent_kernel::model::FileOperationMode::Modify | devagent_kernel::model::FileOperationMode::Auto => {
                    let (original, exists) = fs_safety::read_original(&path);
                    subtask.original_file_content = original;
                    subtask.file_exists = exists;
                    WriteMode::Modify
                }
            };
            fs_safety::write_file(&path, &file_content, mode).map_err(|e| e.to_string())?;
        }

        for command in subtask.commands.clone() {
            let task_id = self.queue.submit(
                AgentTask::new("directive", TaskType::ShellCommand, subtask.description.clone())
                    .with_priority(TaskPriority::High)
                    .with_parameter("command", command),
            );
            let deadline = tokio::time::Instant::now() + self.config.task_wait_timeout;
            loop {
                if let Some(task) = self.queue.get_task(&task_id) {
                    if task.status.is_terminal() {
                        break;
                    }
                }
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    break;
                }
                self.queue.notified(remaining.min(Duration::from_millis(200))).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devagent_kernel::llm::test_support::ScriptedLlmClient;

    #[tokio::test]
    async fn create_plan_parses_subtasks_from_decomposition_reply() {
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![
            "SUBTASK_1:\nDescription: write readme\nPriority: HIGH\n",
            "Execution Order: SUBTASK_1",
        ]));
        let queue = TaskQueue::new();
        let planner = Planner::new(
            llm,
            queue,
            PlannerConfig {
                working_dir: std::env::temp_dir(),
                ..Default::default()
            },
            Arc::new(AutoBackend),
        );

        let goal = Goal::new("write a readme");
        let plan = planner.create_plan(&goal).await;
        assert_eq!(plan.subtasks.len(), 1);
        assert_eq!(plan.subtasks[0].description, "write readme");
    }

    #[tokio::test]
    async fn cancel_plan_removes_it_from_active_plans() {
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![
            "SUBTASK_1:\nDescription: write readme\nPriority: HIGH\n",
            "Execution Order: SUBTASK_1",
        ]));
        let planner = Planner::new(
            llm,
            TaskQueue::new(),
            PlannerConfig {
                working_dir: std::env::temp_dir(),
                ..Default::default()
            },
            Arc::new(AutoBackend),
        );

        let plan = planner.create_plan(&Goal::new("write a readme")).await;
        assert_eq!(planner.get_active_plans().await.len(), 1);

        assert!(planner.cancel_plan(&plan.id).await);
        assert!(planner.get_active_plans().await.is_empty());
        assert_eq!(planner.get_plan(&plan.id).await.unwrap().status, PlanStatus::Cancelled);

        // Cancelling an unknown or already-terminal plan is a no-op, not an error.
        assert!(!planner.cancel_plan(&plan.id).await);
        assert!(!planner.cancel_plan("does-not-exist").await);
    }

    /// `MODIFY`/`AUTO` directives must read the file's current content
    /// into the subtask before overwriting it (spec §4.2.4).
    #[tokio::test]
    async fn directive_phase_reads_original_content_before_modify() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "old = true").unwrap();

        let planner = Planner::new(
            Arc::new(ScriptedLlmClient::new(vec![])),
            TaskQueue::new(),
            PlannerConfig {
                working_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
            Arc::new(AutoBackend),
        );

        let mut subtask = devagent_kernel::model::SubTask::new("update", "update config.toml");
        subtask.file_path = Some("config.toml".to_string());
        subtask.file_content = Some("new = true".to_string());
        subtask.file_operation_mode = devagent_kernel::model::FileOperationMode::Modify;

        planner.run_directive_phase(&mut subtask).await.unwrap();

        assert_eq!(subtask.original_file_content.as_deref(), Some("old = true"));
        assert!(subtask.file_exists);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("config.toml")).unwrap(),
            "new = true"
        );
    }

    /// A subtask with no file directive and no commands is a no-op — it
    /// must not touch the filesystem or the queue.
    #[tokio::test]
    async fn directive_phase_skips_subtasks_with_no_directive() {
        let dir = tempfile::tempdir().unwrap();
        let planner = Planner::new(
            Arc::new(ScriptedLlmClient::new(vec![])),
            TaskQueue::new(),
            PlannerConfig {
                working_dir: dir.path().to_path_buf(),
                ..Default::default()
            },
            Arc::new(AutoBackend),
        );

        let mut subtask = devagent_kernel::model::SubTask::new("noop", "just reasoning");
        assert!(planner.run_directive_phase(&mut subtask).await.is_ok());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    /// An unavailable tool gets an install suggestion recorded in
    /// `workingMemory`, never an auto-install attempt (spec §4.2.2 step 1).
    #[tokio::test]
    async fn tool_availability_check_records_install_suggestion_for_missing_tool() {
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(vec![
            "Install it with: curl -fsSL https://example.invalid/install.sh | sh",
        ]));
        let planner = Planner::new(
            llm,
            TaskQueue::new(),
            PlannerConfig {
                working_dir: std::env::temp_dir(),
                ..Default::default()
            },
            Arc::new(AutoBackend),
        );

        let mut subtask = devagent_kernel::model::SubTask::new("run", "run the definitely-missing tool");
        subtask
            .commands
            .push("definitely-not-a-real-tool-xyz --version".to_string());
        let mut working_memory = HashMap::new();

        planner.check_tool_availability(&subtask, &mut working_memory).await;

        assert!(working_memory.contains_key("install_definitely-not-a-real-tool-xyz"));
    }
}
