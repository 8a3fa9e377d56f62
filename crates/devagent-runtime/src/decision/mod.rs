//! Decision Engine (spec §4.5).
//!
//! An advisory component: every operation funnels one templated prompt
//! through the single [`LlmClient`] collaborator and parses a structured
//! reply. Every parser is tolerant — a malformed reply falls back to a
//! named safe default rather than propagating a parse error, matching the
//! spec's explicit tolerance requirement.

use devagent_kernel::llm::LlmClient;
use devagent_kernel::model::AgentTask;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StrategyType {
    Aggressive,
    Conservative,
    Balanced,
    Reactive,
    Proactive,
    Exploratory,
    Maintenance,
}

impl StrategyType {
    fn parse(token: &str) -> Option<Self> {
        match token.trim().to_uppercase().as_str() {
            "AGGRESSIVE" => Some(Self::Aggressive),
            "CONSERVATIVE" => Some(Self::Conservative),
            "BALANCED" => Some(Self::Balanced),
            "REACTIVE" => Some(Self::Reactive),
            "PROACTIVE" => Some(Self::Proactive),
            "EXPLORATORY" => Some(Self::Exploratory),
            "MAINTENANCE" => Some(Self::Maintenance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StrategyDecision {
    pub strategy: StrategyType,
    pub reasoning: String,
    pub priority: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct ActionDecision {
    pub should_proceed: bool,
    pub reasoning: String,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorAction {
    Retry,
    Skip,
    Stop,
    Escalate,
}

#[derive(Debug, Clone)]
pub struct ErrorDecision {
    pub action: ErrorAction,
    pub reason: String,
    pub retry_delay_ms: u64,
}

impl ErrorDecision {
    fn safe_default(reason: impl Into<String>) -> Self {
        Self {
            action: ErrorAction::Retry,
            reason: reason.into(),
            retry_delay_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MadeDecision {
    pub chosen_option: String,
    pub reasoning: String,
    pub confidence: Option<u8>,
}

/// Extracts the trailing `CONFIDENCE:<0-100>` marker some replies carry.
fn extract_confidence(text: &str) -> Option<u8> {
    let idx = text.to_uppercase().find("CONFIDENCE:")?;
    let rest = &text[idx + "CONFIDENCE:".len()..];
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<u8>().ok().map(|v| v.min(100))
}

/// Picks the first line from `text` that is an exact (case-insensitive)
/// match against `options`, or the first option if none match, never
/// panicking on an unparseable reply.
fn extract_chosen_option(text: &str, options: &[String]) -> String {
    let upper = text.to_uppercase();
    for option in options {
        if upper.contains(&option.to_uppercase()) {
            return option.clone();
        }
    }
    options.first().cloned().unwrap_or_default()
}

pub struct DecisionEngine {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl DecisionEngine {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub async fn make_decision(&self, context: &str, question: &str, options: &[String]) -> MadeDecision {
        let prompt = format!(
            "Context: {context}\nQuestion: {question}\nOptions: {}\nAnswer with your chosen option, your reasoning, and optionally CONFIDENCE:<0-100>.",
            options.join(", ")
        );
        let reply = match self.llm.send(&prompt, self.timeout).await {
            Ok(r) => r,
            Err(_) => return MadeDecision {
                chosen_option: options.first().cloned().unwrap_or_default(),
                reasoning: "LLM call failed; defaulted to first option".to_string(),
                confidence: None,
            },
        };
        MadeDecision {
            chosen_option: extract_chosen_option(&reply, options),
            confidence: extract_confidence(&reply),
            reasoning: reply,
        }
    }

    pub async fn decide_strategy(&self, situation: &str, context: &str) -> StrategyDecision {
        let prompt = format!(
            "Situation: {situation}\nContext: {context}\nChoose a strategy: AGGRESSIVE, CONSERVATIVE, BALANCED, REACTIVE, PROACTIVE, EXPLORATORY, or MAINTENANCE, with a priority and reasoning."
        );
        let reply = match self.llm.send(&prompt, self.timeout).await {
            Ok(r) => r,
            Err(_) => return Self::safe_strategy_default("LLM call failed"),
        };
        let strategy = reply
            .split_whitespace()
            .find_map(StrategyType::parse)
            .unwrap_or(StrategyType::Balanced);
        StrategyDecision {
            strategy,
            reasoning: reply,
            priority: "MEDIUM".to_string(),
        }
    }

    fn safe_strategy_default(reason: &str) -> StrategyDecision {
        StrategyDecision {
            strategy: StrategyType::Balanced,
            reasoning: reason.to_string(),
            priority: "MEDIUM".to_string(),
        }
    }

    pub async fn should_take_action(&self, action: &str, context: &str, metadata: &str) -> ActionDecision {
        let prompt = format!(
            "Action: {action}\nContext: {context}\nMetadata: {metadata}\nShould this proceed? Reply YES or NO with a risk level (LOW, MEDIUM, HIGH) and reasoning."
        );
        let reply = match self.llm.send(&prompt, self.timeout).await {
            Ok(r) => r,
            Err(_) => {
                return ActionDecision {
                    should_proceed: false,
                    reasoning: "LLM call failed; defaulting to not proceeding".to_string(),
                    risk_level: RiskLevel::Medium,
                }
            }
        };
        let upper = reply.to_uppercase();
        let should_proceed = upper.trim_start().starts_with("YES") || upper.contains("SHOULDPROCEED: YES");
        let risk_level = if upper.contains("HIGH") {
            RiskLevel::High
        } else if upper.contains("LOW") {
            RiskLevel::Low
        } else {
            RiskLevel::Medium
        };
        ActionDecision {
            should_proceed,
            reasoning: reply,
            risk_level,
        }
    }

    /// Reorders `tasks` by consulting the LLM; on any parse failure the
    /// original order is preserved unchanged — a failed reprioritisation
    /// must never be worse than doing nothing.
    pub async fn prioritize_tasks(&self, tasks: Vec<AgentTask>, context: &str) -> Vec<AgentTask> {
        if tasks.len() < 2 {
            return tasks;
        }
        let summary = tasks
            .iter()
            .map(|t| format!("{}:{}", t.id, t.name))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Context: {context}\nTasks:\n{summary}\nReply with task ids in the order they should run, one per line."
        );
        let original_order: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let reply = match self.llm.send(&prompt, self.timeout).await {
            Ok(r) => r,
            Err(_) => return tasks,
        };
        let order: Vec<&str> = reply.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let mut by_id: std::collections::HashMap<String, AgentTask> =
            tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        let mut reordered: Vec<AgentTask> = order
            .iter()
            .filter_map(|id| by_id.remove(*id))
            .collect();
        if reordered.is_empty() {
            // Reply named no task this engine knows about — preserve the
            // original order rather than falling back to hash-map order.
            return original_order
                .into_iter()
                .filter_map(|id| by_id.remove(&id))
                .collect();
        }
        // Anything the reply omitted keeps its remaining original-order
        // tasks appended, so no task is ever lost.
        reordered.extend(
            original_order
                .into_iter()
                .filter_map(|id| by_id.remove(&id)),
        );
        reordered
    }

    pub async fn handle_error(&self, error: &str, context: &str) -> ErrorDecision {
        let prompt = format!(
            "Error: {error}\nContext: {context}\nDecide RETRY, SKIP, STOP, or ESCALATE, with a reason and retry delay in ms if RETRY."
        );
        let reply = match self.llm.send(&prompt, self.timeout).await {
            Ok(r) => r,
            Err(_) => return ErrorDecision::safe_default("LLM call failed"),
        };
        let upper = reply.to_uppercase();
        let action = if upper.contains("ESCALATE") {
            ErrorAction::Escalate
        } else if upper.contains("STOP") {
            ErrorAction::Stop
        } else if upper.contains("SKIP") {
            ErrorAction::Skip
        } else if upper.contains("RETRY") {
            ErrorAction::Retry
        } else {
            return ErrorDecision::safe_default(format!("unparseable reply: {reply}"));
        };
        ErrorDecision {
            action,
            reason: reply,
            retry_delay_ms: 5_000,
        }
    }
}
