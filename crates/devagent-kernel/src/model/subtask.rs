use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subtask priority, used to order decomposition output for display and
/// replanning but — unlike [`crate::model::TaskPriority`] — not consulted
/// by the queue scheduler, since subtasks execute sequentially (spec §5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

/// Estimated implementation complexity, used only advisorily by the
/// Planner's prompts; unknown values from a parsed LLM reply default to
/// [`Complexity::Moderate`] (spec §4.2.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Complexity {
    Simple,
    #[default]
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SubTaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Blocked,
}

impl SubTaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// How a file directive (spec §4.2.4) should apply `fileContent` to
/// `filePath`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum FileOperationMode {
    /// Fail if the file already exists.
    Create,
    /// Overwrite unconditionally.
    Replace,
    /// Requires `originalFileContent` to have been read first.
    Modify,
    /// Concatenate onto the existing file.
    Append,
    /// Same preconditions as `Modify`; the implementation picks the
    /// concrete strategy.
    #[default]
    Auto,
}

/// A unit of plan work produced by decomposition (spec §3, §4.2.1).
///
/// Created once by the Planner and mutated only by the Planner as the
/// ReAct cycle for this subtask progresses — callers never reach into a
/// `SubTask` directly, they go through `Plan`'s owning table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub name: String,
    pub description: String,
    pub expected_outcome: String,
    pub priority: Priority,
    pub complexity: Complexity,
    pub dependencies: Vec<String>,
    pub status: SubTaskStatus,
    pub commands: Vec<String>,
    pub code_language: Option<String>,
    pub code_content: Option<String>,
    pub file_path: Option<String>,
    pub file_content: Option<String>,
    pub file_operation_mode: FileOperationMode,
    pub original_file_content: Option<String>,
    pub file_exists: bool,
    pub preserve_context: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error_message: Option<String>,
}

impl SubTask {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            description: description.into(),
            expected_outcome: String::new(),
            priority: Priority::default(),
            complexity: Complexity::default(),
            dependencies: Vec::new(),
            status: SubTaskStatus::default(),
            commands: Vec::new(),
            code_language: None,
            code_content: None,
            file_path: None,
            file_content: None,
            file_operation_mode: FileOperationMode::default(),
            original_file_content: None,
            file_exists: false,
            preserve_context: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error_message: None,
        }
    }

    /// `true` if this subtask carries an inline directive (spec §4.2.2
    /// step 2): a file write, or one or more shell commands, executed
    /// before the subtask's ReAct cycle.
    pub fn has_directive(&self) -> bool {
        (self.file_path.is_some() && self.file_content.is_some()) || !self.commands.is_empty()
    }

    pub fn is_critical(&self) -> bool {
        matches!(self.priority, Priority::Critical)
    }
}
