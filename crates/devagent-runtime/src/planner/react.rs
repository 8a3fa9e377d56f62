//! The ReAct cycle for a single subtask (spec §4.2.3): four strictly
//! ordered LLM calls whose text is stored verbatim in the resulting
//! [`ExecutionStep`].

use devagent_kernel::llm::LlmClient;
use devagent_kernel::model::{ActionSpec, ExecutionStep, StepStatus, SubTask, SubTaskPriority};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::action_parser::{enhance_parameters, parse_action_spec};
use crate::queue::TaskQueue;
use devagent_kernel::model::{AgentTask, TaskResult, TaskStatus};

/// Outcome of one [`run_cycle`] call (spec §4.2.3: `{reasoning, action,
/// observation, success, shouldReplan, memoryUpdates}`).
pub struct CycleOutcome {
    pub step: ExecutionStep,
    pub success: bool,
    pub should_replan: bool,
    pub memory_updates: HashMap<String, String>,
    pub task_result: Option<TaskResult>,
}

/// Drives a subtask's four ReAct phases, submitting the Act-phase action
/// through `queue` and waiting for it to reach a terminal state.
pub async fn run_cycle(
    llm: &Arc<dyn LlmClient>,
    queue: &TaskQueue,
    goal: &str,
    subtask: &SubTask,
    working_memory: &HashMap<String, String>,
    previous_steps: &[ExecutionStep],
    available_tools: &[String],
    llm_timeout: Duration,
    task_wait_timeout: Duration,
) -> CycleOutcome {
    let mut step = ExecutionStep::new(subtask.id.clone());

    let memory_block = working_memory
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ");
    let history_block = previous_steps
        .iter()
        .map(|s| format!("{}: {:?}", s.action, s.status))
        .collect::<Vec<_>>()
        .join("\n");

    let reason_prompt = format!(
        "Goal: {goal}\nSubtask: {}\nWorking memory: {memory_block}\nPrevious steps:\n{history_block}\nAvailable tools: {}\nAction types: FILE_READ, FILE_WRITE, FILE_COPY, FILE_DELETE, SHELL_COMMAND, CODE_GENERATION, AI_ANALYSIS, MCP_TOOL_CALL\nReason about how to accomplish this subtask.",
        subtask.description,
        available_tools.join(", ")
    );
    step.reasoning = call(llm, &reason_prompt, llm_timeout).await;

    let act_prompt = format!(
        "Reasoning: {}\nPropose a single action in this exact format:\nACTION_TYPE: <type>\nACTION_DESCRIPTION: <text>\nPARAMETERS: key=value, key=value\nEXPECTED_OUTCOME: <text>",
        step.reasoning
    );
    let act_reply = call(llm, &act_prompt, llm_timeout).await;
    let action_spec: ActionSpec = enhance_parameters(parse_action_spec(&act_reply));
    step.action = act_reply;

    let task_id = queue.submit(
        AgentTask::new(subtask.name.clone(), action_spec.action_type, action_spec.description.clone())
            .with_parameters_from(&action_spec),
    );
    wait_for_terminal(queue, &task_id, task_wait_timeout).await;
    let task = queue.get_task(&task_id);
    let task_result = task.as_ref().and_then(|t| t.result.clone());
    let task_succeeded = matches!(task.as_ref().map(|t| t.status), Some(TaskStatus::Completed));

    let observe_prompt = format!(
        "Action: {}\nSucceeded: {}\nResult: {:?}\nDescribe what happened.",
        action_spec.description, task_succeeded, task_result
    );
    step.observation = call(llm, &observe_prompt, llm_timeout).await;

    let reflect_prompt = format!(
        "Subtask goal: {}\nObservation: {}\nWas the subtask goal met? Reply YES or NO.",
        subtask.expected_outcome, step.observation
    );
    let reflect_reply = call(llm, &reflect_prompt, llm_timeout).await;
    let reflected_yes = reflect_reply.trim_start().to_lowercase().starts_with("yes")
        || reflect_reply.to_lowercase().contains("yes");

    let success = task_succeeded && reflected_yes;
    step.status = if success { StepStatus::Completed } else { StepStatus::Failed };
    step.completed_at = Some(chrono::Utc::now());
    step.task_id = Some(task_id);
    if !success {
        step.error_message = task_result.as_ref().and_then(|r| r.error.clone());
    }

    let should_replan = !success && subtask.priority == SubTaskPriority::Critical;

    let mut memory_updates = parse_memory_updates(&step.observation);
    memory_updates.extend(parse_memory_updates(&reflect_reply));

    CycleOutcome {
        step,
        success,
        should_replan,
        memory_updates,
        task_result,
    }
}

/// Parses `MEMORY_UPDATE: key=value, key2=value2` markers out of a phase
/// reply (spec §4.2.2 step 4's `memoryUpdates`). Most replies carry no such
/// marker, in which case this returns an empty map rather than requiring
/// every LLM reply to produce one.
fn parse_memory_updates(text: &str) -> HashMap<String, String> {
    let mut updates = HashMap::new();
    for line in text.lines() {
        let upper = line.to_uppercase();
        let Some(label_at) = upper.find("MEMORY_UPDATE") else {
            continue;
        };
        let Some(colon_offset) = line[label_at..].find(':') else {
            continue;
        };
        let rest = &line[label_at + colon_offset + 1..];
        for pair in rest.split(',') {
            if let Some((key, value)) = pair.split_once('=') {
                let key = key.trim();
                let value = value.trim();
                if !key.is_empty() {
                    updates.insert(key.to_string(), value.to_string());
                }
            }
        }
    }
    updates
}

async fn call(llm: &Arc<dyn LlmClient>, prompt: &str, timeout: Duration) -> String {
    llm.send(prompt, timeout)
        .await
        .unwrap_or_else(|e| format!("[llm error: {e}]"))
}

async fn wait_for_terminal(queue: &TaskQueue, task_id: &str, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(task) = queue.get_task(task_id) {
            if task.status.is_terminal() {
                return;
            }
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return;
        }
        queue.notified(remaining.min(Duration::from_millis(200))).await;
    }
}

trait WithActionSpecParameters {
    fn with_parameters_from(self, spec: &ActionSpec) -> Self;
}

impl WithActionSpecParameters for AgentTask {
    fn with_parameters_from(mut self, spec: &ActionSpec) -> Self {
        for (key, value) in &spec.parameters {
            self.parameters.insert(key.clone(), value.clone());
        }
        self
    }
}
