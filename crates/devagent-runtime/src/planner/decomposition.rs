//! Parses the decomposition and strategy LLM replies into [`SubTask`]s and a
//! [`PlanningStrategy`] (spec §4.2.1 phases 2-3).

use devagent_kernel::model::{Complexity, FileOperationMode, PlanningStrategy, SubTask, SubTaskPriority};

/// Splits `reply` on `SUBTASK_<n>:` markers and parses each block's labelled
/// fields into a [`SubTask`]. Unknown enum tokens default leniently
/// (`MEDIUM` priority, `MODERATE` complexity) rather than rejecting the
/// block.
pub fn parse_decomposition(reply: &str) -> Vec<SubTask> {
    let marker = regex::Regex::new(r"SUBTASK_\d+:").unwrap();

    let mut blocks = Vec::new();
    let mut last_end = None;
    for m in marker.find_iter(reply) {
        if let Some(start) = last_end {
            blocks.push(reply[start..m.start()].to_string());
        }
        last_end = Some(m.end());
    }
    if let Some(start) = last_end {
        blocks.push(reply[start..].to_string());
    }

    blocks.into_iter().map(|block| parse_subtask_block(&block)).collect()
}

fn field(block: &str, label: &str) -> Option<String> {
    for line in block.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix(label) {
            let rest = rest.trim_start();
            if let Some(rest) = rest.strip_prefix(':') {
                let value = rest.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

fn parse_subtask_block(block: &str) -> SubTask {
    let description = field(block, "Description").unwrap_or_default();
    let name = description.chars().take(60).collect::<String>();
    let mut subtask = SubTask::new(if name.is_empty() { "subtask".to_string() } else { name }, description);

    subtask.expected_outcome = field(block, "Expected Outcome").unwrap_or_default();

    subtask.priority = match field(block, "Priority").as_deref().map(str::to_uppercase).as_deref() {
        Some("CRITICAL") => SubTaskPriority::Critical,
        Some("HIGH") => SubTaskPriority::High,
        Some("LOW") => SubTaskPriority::Low,
        _ => SubTaskPriority::Medium,
    };

    subtask.complexity = match field(block, "Complexity").as_deref().map(str::to_uppercase).as_deref() {
        Some("SIMPLE") => Complexity::Simple,
        Some("COMPLEX") => Complexity::Complex,
        _ => Complexity::Moderate,
    };

    subtask.dependencies = match field(block, "Dependencies") {
        Some(value) if value.to_uppercase() != "NONE" => {
            value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
        }
        _ => Vec::new(),
    };

    subtask.commands = field(block, "Commands")
        .map(|value| value.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();

    subtask.code_language = field(block, "Code Language");
    subtask.code_content = field(block, "Code Content");
    subtask.file_path = field(block, "File Path");
    subtask.file_content = field(block, "File Content");
    if subtask.file_path.is_some() {
        subtask.file_operation_mode = FileOperationMode::Auto;
    }

    subtask
}

/// Parses the free-form strategy reply, keeping the order the LLM already
/// produced rather than re-deriving it (spec §4.2.1 phase 3).
pub fn parse_strategy(reply: &str) -> PlanningStrategy {
    let execution_order = field(reply, "Execution Order")
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let risk_mitigation = field(reply, "Risk Mitigation").unwrap_or_default();
    PlanningStrategy {
        description: reply.trim().to_string(),
        execution_order,
        parallel_groups: Vec::new(),
        risk_mitigation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_subtasks_with_mixed_fields() {
        let reply = r#"
SUBTASK_1:
Description: Write the README
Expected Outcome: README.md exists
Priority: HIGH
Complexity: SIMPLE
Dependencies: NONE
File Path: README.md
File Content: # Demo

SUBTASK_2:
Description: Run the test suite
Expected Outcome: tests pass
Priority: CRITICAL
Dependencies: SUBTASK_1
Commands: cargo test
"#;
        let subtasks = parse_decomposition(reply);
        assert_eq!(subtasks.len(), 2);
        assert_eq!(subtasks[0].priority, SubTaskPriority::High);
        assert_eq!(subtasks[0].file_path.as_deref(), Some("README.md"));
        assert!(subtasks[1].is_critical());
        assert_eq!(subtasks[1].commands, vec!["cargo test".to_string()]);
    }

    #[test]
    fn unknown_enum_tokens_default_leniently() {
        let reply = "SUBTASK_1:\nDescription: do a thing\nPriority: URGENT\nComplexity: HARD\n";
        let subtasks = parse_decomposition(reply);
        assert_eq!(subtasks[0].priority, SubTaskPriority::Medium);
        assert_eq!(subtasks[0].complexity, Complexity::Moderate);
    }

    #[test]
    fn dependencies_none_parses_to_empty_vec() {
        let reply = "SUBTASK_1:\nDescription: d\nDependencies: NONE\n";
        let subtasks = parse_decomposition(reply);
        assert!(subtasks[0].dependencies.is_empty());
    }

    #[test]
    fn strategy_parse_keeps_free_form_description() {
        let reply = "Execution Order: SUBTASK_1, SUBTASK_2\nRisk Mitigation: run tests before deploy";
        let strategy = parse_strategy(reply);
        assert_eq!(strategy.execution_order, vec!["SUBTASK_1", "SUBTASK_2"]);
        assert!(strategy.description.contains("Risk Mitigation"));
    }
}
