//! `devagent-runtime` — concrete implementations of every component
//! `devagent-kernel` declares contracts for: the Agent Lifecycle
//! Controller, the Planning/ReAct Engine, the Task Queue & Executor, the
//! State Manager, and the Decision Engine (spec §4).
//!
//! There is no hidden global: [`AgentEngine`] is the single construction
//! site that wires every collaborator together (spec §9 Design Note —
//! "own all of it inside the `AgentEngine` value; the singleton is a
//! single construction site in `main`").

pub mod controller;
pub mod decision;
pub mod error;
pub mod fs_safety;
pub mod planner;
pub mod queue;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use devagent_kernel::config::AgentEngineConfig;
use devagent_kernel::llm::LlmClient;
use devagent_kernel::model::{AgentTask, Goal, Plan, PlanExecution};

pub use controller::{AgentController, AgentStatus, ControllerConfig};
pub use decision::DecisionEngine;
pub use error::{RuntimeError, RuntimeResult};
pub use planner::{AutoBackend, InteractionBackend, Planner, PlannerConfig, TtyBackend};
pub use queue::{HandlerRegistry, TaskQueue};
pub use state::StateManager;

/// Registers the built-in [`queue::ActionHandler`] for every [`devagent_kernel::model::TaskType`]
/// (spec §4.3.3's per-type table), wiring in `llm` for the two LLM-backed
/// handlers (`CODE_GENERATION`, `AI_ANALYSIS`) and `file_read_cap` for
/// `FILE_READ` (spec §6 `fileOps.maxReadSize`).
pub fn default_handler_registry(
    llm: Arc<dyn LlmClient>,
    shell_timeout: Duration,
    file_read_cap: u64,
    working_dir: std::path::PathBuf,
) -> HandlerRegistry {
    use devagent_kernel::model::TaskType;
    use queue::{
        AiAnalysisHandler, CodeGenerationHandler, FileCopyHandler, FileDeleteHandler,
        FileReadHandler, FileWriteHandler, McpToolCallHandler, ShellCommandHandler,
    };

    let mut registry = HandlerRegistry::new();
    registry.register(
        TaskType::ShellCommand,
        Arc::new(ShellCommandHandler { timeout: shell_timeout }),
    );
    registry.register(
        TaskType::FileRead,
        Arc::new(FileReadHandler { max_read_size: file_read_cap as usize }),
    );
    registry.register(TaskType::FileWrite, Arc::new(FileWriteHandler { working_dir }));
    registry.register(TaskType::FileCopy, Arc::new(FileCopyHandler));
    registry.register(TaskType::FileDelete, Arc::new(FileDeleteHandler));
    registry.register(
        TaskType::CodeGeneration,
        Arc::new(CodeGenerationHandler { llm: Arc::clone(&llm) }),
    );
    registry.register(TaskType::AiAnalysis, Arc::new(AiAnalysisHandler { llm: Arc::clone(&llm) }));
    registry.register(TaskType::McpToolCall, Arc::new(McpToolCallHandler));
    registry
}

/// The single value a caller constructs: owns the Lifecycle Controller and
/// the Planner, sharing one [`TaskQueue`] between them exactly as spec
/// §2's data/control flow describes ("the Planner ... dispatch[es] via
/// queue"). This is the engine's whole programmatic surface (spec §6):
/// `start`/`stop`/`submit`/`status` plus `create_plan`/`execute_plan`/
/// `get_plan`/`cancel_plan`.
pub struct AgentEngine {
    controller: AgentController,
    planner: Planner,
}

impl AgentEngine {
    /// Builds every collaborator from `config` and `llm`, using a TTY
    /// [`InteractionBackend`] if `interactive` is true, else
    /// [`AutoBackend`] (spec §4.2.5).
    pub async fn new(
        agent_id: impl Into<String>,
        config: AgentEngineConfig,
        llm: Arc<dyn LlmClient>,
        working_dir: std::path::PathBuf,
        interactive: bool,
    ) -> Self {
        let llm_timeout = Duration::from_secs(60);
        let state_file = config.agent.state_persistence.enabled.then(|| {
            std::path::PathBuf::from(&config.agent.state_persistence.file_path)
        });
        let state = StateManager::init(
            agent_id,
            state_file,
            config.agent.state_persistence.max_history_entries,
            config.agent.state_persistence.max_history_entries.min(200),
        )
        .await;

        let queue = TaskQueue::new();
        let decision = Arc::new(DecisionEngine::new(Arc::clone(&llm), llm_timeout));
        let handlers = default_handler_registry(
            Arc::clone(&llm),
            llm_timeout,
            config.file_ops.max_read_size,
            working_dir.clone(),
        );

        let controller = AgentController::new(
            ControllerConfig::from(&config.agent),
            queue.clone(),
            state,
            decision,
            handlers,
        );

        let interaction: Arc<dyn InteractionBackend> = if interactive {
            Arc::new(TtyBackend)
        } else {
            Arc::new(AutoBackend)
        };
        let planner = Planner::new(
            llm,
            queue,
            PlannerConfig {
                working_dir,
                llm_timeout,
                ..Default::default()
            },
            interaction,
        );

        Self { controller, planner }
    }

    pub async fn start_agent(&self) -> RuntimeResult<()> {
        self.controller.start().await
    }

    pub async fn stop_agent(&self) {
        self.controller.stop().await
    }

    pub fn submit_task(&self, task: AgentTask) -> String {
        self.controller.submit(task)
    }

    pub async fn get_status(&self) -> AgentStatus {
        self.controller.status().await
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    /// Rejects an empty/whitespace-only goal at the API boundary (spec §7:
    /// "User input error ... Reject at API boundary") before delegating to
    /// the Planner.
    pub async fn create_plan(&self, goal: &Goal) -> RuntimeResult<Plan> {
        if goal.is_empty() {
            return Err(RuntimeError::InvalidInput("goal text must not be empty".to_string()));
        }
        Ok(self.planner.create_plan(goal).await)
    }

    pub async fn execute_plan(&self, plan_id: &str) -> RuntimeResult<PlanExecution> {
        self.planner
            .execute_plan(plan_id)
            .await
            .ok_or_else(|| RuntimeError::InvalidInput(format!("unknown plan id: {plan_id}")))
    }

    pub async fn get_plan(&self, plan_id: &str) -> Option<Plan> {
        self.planner.get_plan(plan_id).await
    }

    pub async fn get_active_plans(&self) -> Vec<Plan> {
        self.planner.get_active_plans().await
    }

    pub async fn cancel_plan(&self, plan_id: &str) -> bool {
        self.planner.cancel_plan(plan_id).await
    }
}
