//! Parses the Act-phase reply into an [`ActionSpec`] (spec §4.2.3).

use devagent_kernel::model::{ActionSpec, TaskType};

fn strip_markdown_artifacts(text: &str) -> String {
    text.replace("```", "").replace('`', "").trim().to_string()
}

fn field_line<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let trimmed = line.trim();
        trimmed.strip_prefix(label).map(str::trim_start).and_then(|rest| rest.strip_prefix(':')).map(str::trim)
    })
}

/// Splits `raw` on commas that precede a `key=` token, so values containing
/// embedded commas that are *not* followed by another key never get cut —
/// the sole exception spec §4.2.3 calls out ("split pairs only on commas
/// that precede `key=`").
fn split_parameter_pairs(raw: &str) -> Vec<String> {
    let assignment = regex::Regex::new(r",\s*(?=[A-Za-z_][A-Za-z0-9_]*\s*=)").unwrap();
    assignment.split(raw).map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

/// Parses the exact textual template from the Act-phase prompt:
/// ```text
/// ACTION_TYPE: <one of the TaskTypes>
/// ACTION_DESCRIPTION: <text>
/// PARAMETERS: key=value, key=value, …
/// EXPECTED_OUTCOME: <text>
/// ```
/// Unknown `ACTION_TYPE` defaults to `AI_ANALYSIS` (spec §4.2.3) rather than
/// failing the cycle.
pub fn parse_action_spec(reply: &str) -> ActionSpec {
    let cleaned = strip_markdown_artifacts(reply);

    let action_type_token = field_line(&cleaned, "ACTION_TYPE").unwrap_or("");
    let action_type = TaskType::parse_lenient(action_type_token);

    let description = field_line(&cleaned, "ACTION_DESCRIPTION").unwrap_or("").to_string();
    let expected_outcome = field_line(&cleaned, "EXPECTED_OUTCOME").unwrap_or("").to_string();

    let mut spec = ActionSpec::new(action_type, description).with_expected_outcome(expected_outcome);

    if let Some(raw_params) = field_line(&cleaned, "PARAMETERS") {
        for pair in split_parameter_pairs(raw_params) {
            if let Some((key, value)) = pair.split_once('=') {
                spec = spec.with_parameter(key.trim(), unquote(value));
            }
        }
    }

    spec
}

/// Fills in missing required parameters with safe defaults before dispatch
/// (spec §4.3.4) so a malformed or terse LLM reply never halts the
/// pipeline.
pub fn enhance_parameters(mut spec: ActionSpec) -> ActionSpec {
    match spec.action_type {
        TaskType::ShellCommand if !spec.parameters.contains_key("command") => {
            let fallback = extract_command_from_description(&spec.description)
                .unwrap_or_else(|| "echo 'No command specified'".to_string());
            spec = spec.with_parameter("command", fallback);
        }
        TaskType::FileWrite if !spec.parameters.contains_key("content") => {
            spec = spec.with_parameter("content", "// placeholder content");
        }
        TaskType::CodeGeneration if !spec.parameters.contains_key("language") => {
            spec = spec.with_parameter("language", "python");
        }
        TaskType::AiAnalysis if !spec.parameters.contains_key("context") => {
            spec = spec.with_parameter("context", "General analysis");
        }
        _ => {}
    }
    spec
}

fn extract_command_from_description(description: &str) -> Option<String> {
    let known = ["cargo", "npm", "pip", "git", "make", "python", "node", "go"];
    description
        .split_whitespace()
        .position(|word| known.contains(&word))
        .map(|idx| description.split_whitespace().skip(idx).collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_template() {
        let reply = "ACTION_TYPE: SHELL_COMMAND\nACTION_DESCRIPTION: run tests\nPARAMETERS: command=cargo test, working_directory=/tmp/proj\nEXPECTED_OUTCOME: tests pass";
        let spec = parse_action_spec(reply);
        assert_eq!(spec.action_type, TaskType::ShellCommand);
        assert_eq!(spec.parameters.get("command").unwrap(), "cargo test");
        assert_eq!(spec.parameters.get("working_directory").unwrap(), "/tmp/proj");
    }

    #[test]
    fn strips_code_fences_and_backticks() {
        let reply = "```\nACTION_TYPE: FILE_WRITE\nACTION_DESCRIPTION: write file\nPARAMETERS: file_path=`notes.txt`, content=hello\nEXPECTED_OUTCOME: file exists\n```";
        let spec = parse_action_spec(reply);
        assert_eq!(spec.action_type, TaskType::FileWrite);
        assert_eq!(spec.parameters.get("file_path").unwrap(), "notes.txt");
    }

    #[test]
    fn unknown_action_type_defaults_to_ai_analysis() {
        let reply = "ACTION_TYPE: FRANGIBLE\nACTION_DESCRIPTION: d\nPARAMETERS:\nEXPECTED_OUTCOME: o";
        let spec = parse_action_spec(reply);
        assert_eq!(spec.action_type, TaskType::AiAnalysis);
    }

    #[test]
    fn commas_inside_values_are_preserved_when_not_followed_by_key() {
        let reply = "ACTION_TYPE: CODE_GENERATION\nACTION_DESCRIPTION: d\nPARAMETERS: task_description=sort, dedupe, and trim the list, language=python\nEXPECTED_OUTCOME: o";
        let spec = parse_action_spec(reply);
        assert_eq!(
            spec.parameters.get("task_description").unwrap(),
            "sort, dedupe, and trim the list"
        );
        assert_eq!(spec.parameters.get("language").unwrap(), "python");
    }

    #[test]
    fn unquotes_outer_quotes() {
        let reply = "ACTION_TYPE: SHELL_COMMAND\nACTION_DESCRIPTION: d\nPARAMETERS: command=\"echo hi\"\nEXPECTED_OUTCOME: o";
        let spec = parse_action_spec(reply);
        assert_eq!(spec.parameters.get("command").unwrap(), "echo hi");
    }

    #[test]
    fn enhance_fills_missing_shell_command_from_description() {
        let spec = ActionSpec::new(TaskType::ShellCommand, "please run cargo test now");
        let enhanced = enhance_parameters(spec);
        assert_eq!(enhanced.parameters.get("command").unwrap(), "cargo test now");
    }

    #[test]
    fn enhance_falls_back_to_echo_when_no_keyword_found() {
        let spec = ActionSpec::new(TaskType::ShellCommand, "do something vague");
        let enhanced = enhance_parameters(spec);
        assert_eq!(enhanced.parameters.get("command").unwrap(), "echo 'No command specified'");
    }

    #[test]
    fn enhance_leaves_present_parameters_untouched() {
        let spec = ActionSpec::new(TaskType::CodeGeneration, "d").with_parameter("language", "rust");
        let enhanced = enhance_parameters(spec);
        assert_eq!(enhanced.parameters.get("language").unwrap(), "rust");
    }
}
