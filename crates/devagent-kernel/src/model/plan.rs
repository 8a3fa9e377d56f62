use super::SubTask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PlanStatus {
    #[default]
    Created,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

/// The execution-order / risk-mitigation narrative produced by the
/// strategy prompt (spec §4.2.1 phase 3). The reference parser keeps the
/// order already produced by the LLM rather than re-deriving it, so this
/// type is deliberately close to free text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanningStrategy {
    pub description: String,
    pub execution_order: Vec<String>,
    pub parallel_groups: Vec<Vec<String>>,
    pub risk_mitigation: String,
}

/// Ordered list of subtasks derived from a [`crate::model::Goal`] (spec
/// §3). Immutable after creation except for `status`, which the Planner
/// updates as execution of this plan progresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub goal: String,
    pub subtasks: Vec<SubTask>,
    pub strategy: PlanningStrategy,
    pub context: HashMap<String, String>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    /// Tools the context probe found on the local OS at creation time
    /// (spec §4.2.1 phase 1), carried forward so every ReAct cycle's
    /// Reason phase sees the same probed set rather than re-probing per
    /// subtask.
    pub available_tools: Vec<String>,
}

impl Plan {
    pub fn new(goal: impl Into<String>, subtasks: Vec<SubTask>, strategy: PlanningStrategy) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            goal: goal.into(),
            subtasks,
            strategy,
            context: HashMap::new(),
            status: PlanStatus::default(),
            created_at: Utc::now(),
            available_tools: Vec::new(),
        }
    }

    pub fn subtask(&self, id: &str) -> Option<&SubTask> {
        self.subtasks.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StepStatus {
    #[default]
    Running,
    Completed,
    Failed,
    Skipped,
}

/// One ReAct cycle's record for a single subtask (spec §3, §4.2.3). Every
/// field is the verbatim LLM reply text for that phase, never
/// re-summarised, so a human or a later replanning prompt can inspect
/// exactly what reasoning led to this outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub sub_task_id: String,
    pub reasoning: String,
    pub action: String,
    pub observation: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub task_id: Option<String>,
}

impl ExecutionStep {
    pub fn new(sub_task_id: impl Into<String>) -> Self {
        Self {
            sub_task_id: sub_task_id.into(),
            reasoning: String::new(),
            action: String::new(),
            observation: String::new(),
            status: StepStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
            task_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PlanExecutionStatus {
    #[default]
    Running,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

/// Per-execution working state carried across ReAct cycles within one plan
/// (spec §3). `working_memory` is scoped to this execution;
/// `episodic_memory` is the slice of cross-plan memory (from
/// [`crate::model::AgentState`]'s `memory` map) this execution was seeded
/// with and may add to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecution {
    pub plan_id: String,
    pub status: PlanExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<ExecutionStep>,
    pub working_memory: HashMap<String, serde_json::Value>,
    pub episodic_memory: HashMap<String, serde_json::Value>,
    pub current_reasoning: String,
    pub current_step_index: usize,
    pub failure_reason: Option<String>,
}

impl PlanExecution {
    pub fn new(plan_id: impl Into<String>) -> Self {
        Self {
            plan_id: plan_id.into(),
            status: PlanExecutionStatus::default(),
            started_at: Utc::now(),
            completed_at: None,
            steps: Vec::new(),
            working_memory: HashMap::new(),
            episodic_memory: HashMap::new(),
            current_reasoning: String::new(),
            current_step_index: 0,
            failure_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubTask;

    #[test]
    fn steps_length_never_exceeds_subtask_count() {
        let subtasks = vec![SubTask::new("a", "a"), SubTask::new("b", "b")];
        let plan = Plan::new("goal", subtasks, PlanningStrategy::default());
        let mut exec = PlanExecution::new(plan.id.clone());
        for st in &plan.subtasks {
            exec.steps.push(ExecutionStep::new(st.id.clone()));
        }
        assert!(exec.steps.len() <= plan.subtasks.len());
        for step in &exec.steps {
            assert!(plan.subtask(&step.sub_task_id).is_some());
        }
    }

    #[test]
    fn plan_status_defaults_to_created() {
        assert_eq!(PlanStatus::default(), PlanStatus::Created);
    }
}
