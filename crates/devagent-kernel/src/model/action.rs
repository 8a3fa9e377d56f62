use super::TaskType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The Planner's decision about one action to take during the Act phase of
/// a ReAct cycle (spec §4.2.3). Parsed from the LLM's reply to the exact
/// textual template:
///
/// ```text
/// ACTION_TYPE: <one of the TaskTypes>
/// ACTION_DESCRIPTION: <text>
/// PARAMETERS: key=value, key=value, …
/// EXPECTED_OUTCOME: <text>
/// ```
///
/// `BTreeMap` rather than `HashMap` for `parameters` so the round-trip law
/// in spec §8 ("parse-then-serialise... preserves every parameter
/// key/value") is trivially exercised with deterministic ordering in tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub action_type: TaskType,
    pub description: String,
    pub parameters: BTreeMap<String, String>,
    pub expected_outcome: String,
}

impl ActionSpec {
    pub fn new(action_type: TaskType, description: impl Into<String>) -> Self {
        Self {
            action_type,
            description: description.into(),
            parameters: BTreeMap::new(),
            expected_outcome: String::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_expected_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = outcome.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_fields() {
        let spec = ActionSpec::new(TaskType::ShellCommand, "run tests")
            .with_parameter("command", "cargo test")
            .with_parameter("working_directory", "/tmp/proj")
            .with_expected_outcome("tests pass");

        let json = serde_json::to_string(&spec).unwrap();
        let back: ActionSpec = serde_json::from_str(&json).unwrap();

        assert_eq!(back.action_type, spec.action_type);
        assert_eq!(back.description, spec.description);
        assert_eq!(back.expected_outcome, spec.expected_outcome);
        assert_eq!(back.parameters, spec.parameters);
        assert_eq!(
            back.parameters.get("command").map(String::as_str),
            Some("cargo test")
        );
    }
}
