use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A development goal submitted to the Planner: free-form text plus a bag
/// of context the caller wants threaded through decomposition and every
/// ReAct cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Goal {
    pub text: String,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl Goal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// `true` for an empty or all-whitespace goal — rejected at the API
    /// boundary per the "user input error" row of spec §7.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_goal_detected() {
        assert!(Goal::new("   ").is_empty());
        assert!(!Goal::new("do the thing").is_empty());
    }

    #[test]
    fn context_builder_accumulates() {
        let goal = Goal::new("build").with_context("repo", "devagent").with_context("lang", "rust");
        assert_eq!(goal.context.get("repo"), Some(&"devagent".to_string()));
        assert_eq!(goal.context.len(), 2);
    }
}
