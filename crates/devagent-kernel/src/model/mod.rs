//! The agent engine's data model (spec §3).
//!
//! Every type here is plain data — serializable, cloneable, carrying no
//! behaviour beyond small invariant-preserving constructors and queries.
//! Mutation goes through the owning component (the Planner owns `Plan`/
//! `SubTask`, the Task Queue owns `AgentTask`, the State Manager owns
//! `AgentState`), matching the Design Note in spec §9: "model as a tagged
//! record with an `update` function returning a new value; the owner keeps
//! a small lock around the mapping from id to current record" rather than
//! mutable records with setters reachable from anywhere.

mod action;
mod goal;
mod plan;
mod state;
mod subtask;
mod task;

pub use action::ActionSpec;
pub use goal::Goal;
pub use plan::{ExecutionStep, Plan, PlanExecution, PlanExecutionStatus, PlanStatus, PlanningStrategy, StepStatus};
pub use state::{AgentState, AgentStateSnapshot, HistoryEntry, StateChangeType, StateValue};
pub use subtask::{
    Complexity, FileOperationMode, Priority as SubTaskPriority, SubTask, SubTaskStatus,
};
pub use task::{AgentTask, TaskPriority, TaskResult, TaskStatus, TaskType};
