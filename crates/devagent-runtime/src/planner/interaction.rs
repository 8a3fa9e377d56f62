//! Interactive failure protocol (spec §4.2.5).

use devagent_kernel::model::{ExecutionStep, SubTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureChoice {
    Continue,
    Stop,
    Retry,
}

/// A structured report of a failed ReAct cycle, shown to the user before
/// asking for a [`FailureChoice`] (spec §4.2.5).
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub subtask_description: String,
    pub action: String,
    pub observation: String,
    pub exit_code: Option<i32>,
    pub output_head: String,
    pub suggested_commands: Vec<String>,
}

impl FailureReport {
    pub fn from_step(subtask: &SubTask, step: &ExecutionStep, exit_code: Option<i32>, output: &str) -> Self {
        let output_head = output.lines().take(10).collect::<Vec<_>>().join("\n");
        Self {
            subtask_description: subtask.description.clone(),
            action: step.action.clone(),
            observation: step.observation.clone(),
            exit_code,
            output_head,
            suggested_commands: Vec::new(),
        }
    }
}

/// How the Planner asks a human (or a script) to resolve a failed subtask.
/// The kernel-style trait/impl split lets tests and non-interactive
/// deployments supply their own backend without the Planner depending on a
/// concrete TTY library.
#[async_trait::async_trait]
pub trait InteractionBackend: Send + Sync {
    async fn ask(&self, report: &FailureReport, is_critical: bool) -> FailureChoice;
}

/// Non-interactive default: `Continue` for non-critical subtasks, `Stop`
/// for `CRITICAL` ones (spec §4.2.5's no-TTY fallback).
pub struct AutoBackend;

#[async_trait::async_trait]
impl InteractionBackend for AutoBackend {
    async fn ask(&self, _report: &FailureReport, is_critical: bool) -> FailureChoice {
        if is_critical {
            FailureChoice::Stop
        } else {
            FailureChoice::Continue
        }
    }
}

/// Prompts an attached terminal via stdin. Falls back to [`AutoBackend`]'s
/// policy if stdin is closed or yields unparseable input.
pub struct TtyBackend;

#[async_trait::async_trait]
impl InteractionBackend for TtyBackend {
    async fn ask(&self, report: &FailureReport, is_critical: bool) -> FailureChoice {
        println!("Subtask failed: {}", report.subtask_description);
        println!("Action: {}", report.action);
        println!("Observation: {}", report.observation);
        if let Some(code) = report.exit_code {
            println!("Exit code: {code}");
        }
        if !report.output_head.is_empty() {
            println!("Output (head):\n{}", report.output_head);
        }
        println!("Continue (c) / Stop (s) / Retry (r)?");

        let read = tokio::task::spawn_blocking(|| {
            let mut buf = String::new();
            std::io::stdin().read_line(&mut buf).map(|_| buf)
        })
        .await;

        let input = match read {
            Ok(Ok(buf)) => buf,
            _ => String::new(),
        };

        match input.trim().to_lowercase().as_str() {
            "c" | "continue" => FailureChoice::Continue,
            "s" | "stop" => FailureChoice::Stop,
            "r" | "retry" => FailureChoice::Retry,
            _ => AutoBackend.ask(report, is_critical).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devagent_kernel::model::SubTaskPriority;

    fn step() -> ExecutionStep {
        ExecutionStep::new("s1")
    }

    #[tokio::test]
    async fn auto_backend_continues_for_non_critical() {
        let mut subtask = SubTask::new("n", "d");
        subtask.priority = SubTaskPriority::Medium;
        let report = FailureReport::from_step(&subtask, &step(), Some(1), "boom");
        let choice = AutoBackend.ask(&report, subtask.is_critical()).await;
        assert_eq!(choice, FailureChoice::Continue);
    }

    #[tokio::test]
    async fn auto_backend_stops_for_critical() {
        let mut subtask = SubTask::new("n", "d");
        subtask.priority = SubTaskPriority::Critical;
        let report = FailureReport::from_step(&subtask, &step(), Some(1), "boom");
        let choice = AutoBackend.ask(&report, subtask.is_critical()).await;
        assert_eq!(choice, FailureChoice::Stop);
    }

    #[test]
    fn failure_report_caps_output_at_ten_lines() {
        let subtask = SubTask::new("n", "d");
        let output = (0..20).map(|i| format!("line{i}")).collect::<Vec<_>>().join("\n");
        let report = FailureReport::from_step(&subtask, &step(), None, &output);
        assert_eq!(report.output_head.lines().count(), 10);
    }
}
