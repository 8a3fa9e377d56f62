use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The closed set of action types the executor knows how to run (spec §3,
/// §4.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    FileRead,
    FileWrite,
    FileCopy,
    FileDelete,
    ShellCommand,
    CodeGeneration,
    AiAnalysis,
    McpToolCall,
}

impl TaskType {
    /// Parses the `ACTION_TYPE:` token from a ReAct Act-phase reply.
    /// Unknown tokens default to [`TaskType::AiAnalysis`] (spec §4.2.3) —
    /// a malformed LLM response must never halt the pipeline.
    pub fn parse_lenient(token: &str) -> Self {
        match token.trim().to_uppercase().as_str() {
            "FILE_READ" => Self::FileRead,
            "FILE_WRITE" => Self::FileWrite,
            "FILE_COPY" => Self::FileCopy,
            "FILE_DELETE" => Self::FileDelete,
            "SHELL_COMMAND" => Self::ShellCommand,
            "CODE_GENERATION" => Self::CodeGeneration,
            "AI_ANALYSIS" => Self::AiAnalysis,
            "MCP_TOOL_CALL" => Self::McpToolCall,
            _ => Self::AiAnalysis,
        }
    }
}

/// Queue priority. Distinct from [`crate::model::SubTaskPriority`] — spec
/// §3 defines `AgentTask.priority` over three levels (`HIGH, MEDIUM, LOW`),
/// one fewer than subtask priority's four (`CRITICAL` is absent — nothing
/// in the queue races against a human deadline, only against other
/// `AgentTask`s).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TaskPriority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum TaskStatus {
    #[default]
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Validates one hop of the transition graph required by spec §8:
    /// `PENDING -> READY -> RUNNING -> (COMPLETED | FAILED | CANCELLED)`,
    /// plus the two direct-cancellation edges spec §5 calls out
    /// (`RUNNING|PENDING -> CANCELLED`).
    pub fn can_transition_to(&self, next: Self) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Cancelled)
                | (Ready, Running)
                | (Ready, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

/// Output of one executed [`AgentTask`] (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskResult {
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: Option<String>,
    pub files_created: Vec<String>,
    pub commands_executed: Vec<String>,
    pub duration_ms: u64,
    /// File content read before a `MODIFY`/`AUTO` `FILE_WRITE` overwrote it
    /// (spec §4.2.4). `None` for every other task type and mode.
    pub original_content: Option<String>,
}

impl TaskResult {
    pub fn success(output: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            exit_code: Some(0),
            output: output.into(),
            error: None,
            files_created: Vec::new(),
            commands_executed: Vec::new(),
            duration_ms,
            original_content: None,
        }
    }

    pub fn failure(error: impl Into<String>, exit_code: Option<i32>, duration_ms: u64) -> Self {
        Self {
            exit_code,
            output: String::new(),
            error: Some(error.into()),
            files_created: Vec::new(),
            commands_executed: Vec::new(),
            duration_ms,
            original_content: None,
        }
    }

    /// The invariant from spec §3: `exitCode == 0 <=> status == COMPLETED`
    /// for `SHELL_COMMAND` tasks.
    pub fn shell_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The unit of work dispatched by the Task Queue & Executor (spec §3,
/// §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub description: String,
    pub parameters: BTreeMap<String, String>,
    pub priority: TaskPriority,
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl AgentTask {
    pub fn new(name: impl Into<String>, task_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            task_type,
            description: description.into(),
            parameters: BTreeMap::new(),
            priority: TaskPriority::default(),
            dependencies: Vec::new(),
            status: TaskStatus::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}
