use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// The closed value schema for [`AgentState`] (spec §9 Design Note:
/// "replace reflection-heavy JSON conversion with a small fixed schema").
/// Anything that does not fit is stringified by the caller before storing,
/// which removes the need for a runtime type token at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<StateValue>),
    Map(HashMap<String, StateValue>),
}

impl StateValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for StateValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for StateValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StateChangeType {
    StateUpdate,
    StateRemoved,
    StateCleared,
    MemoryUpdate,
    SystemEvent,
}

/// One append-only entry in [`AgentState::history`] (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub change_type: StateChangeType,
    pub key: String,
    pub old_value: Option<StateValue>,
    pub new_value: Option<StateValue>,
}

/// The agent's process-wide persisted state plus an ephemeral `memory` map
/// that is never written to a snapshot (spec §3).
///
/// Every mutation of `state` (not `memory`) appends a [`HistoryEntry`];
/// once `history.len() > max_history_entries` the oldest entry is evicted,
/// giving a ring buffer bounded at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub state: HashMap<String, StateValue>,
    pub history: VecDeque<HistoryEntry>,
    #[serde(skip)]
    pub memory: HashMap<String, StateValue>,
    pub max_history_entries: usize,
}

impl AgentState {
    pub fn new(max_history_entries: usize) -> Self {
        Self {
            state: HashMap::new(),
            history: VecDeque::new(),
            memory: HashMap::new(),
            max_history_entries,
        }
    }

    /// Seed the counters an [`AgentEngine`](../../devagent_runtime/index.html)
    /// startup records fresh when no snapshot exists (spec §4.1 step 3).
    pub fn seed_fresh(&mut self, agent_id: impl Into<String>, start_time: DateTime<Utc>) {
        self.set_state("agent_id", StateValue::from(agent_id.into()));
        self.set_state("start_time", StateValue::from(start_time.to_rfc3339()));
        self.set_state("total_tasks_executed", StateValue::from(0_i64));
        self.set_state("failed_tasks", StateValue::from(0_i64));
        self.set_state("pending_tasks", StateValue::from(0_i64));
        self.set_state("cycle_count", StateValue::from(0_i64));
    }

    /// Set a state key, appending one [`HistoryEntry`] and evicting the
    /// oldest entry if the ring buffer is now over capacity.
    pub fn set_state(&mut self, key: impl Into<String>, value: StateValue) {
        let key = key.into();
        let old_value = self.state.insert(key.clone(), value.clone());
        self.push_history(StateChangeType::StateUpdate, key, old_value, Some(value));
    }

    pub fn get_state(&self, key: &str) -> Option<&StateValue> {
        self.state.get(key)
    }

    pub fn remove_state(&mut self, key: &str) {
        if let Some(old_value) = self.state.remove(key) {
            self.push_history(
                StateChangeType::StateRemoved,
                key.to_string(),
                Some(old_value),
                None,
            );
        }
    }

    pub fn clear_all(&mut self) {
        self.state.clear();
        self.memory.clear();
        self.push_history(StateChangeType::StateCleared, String::new(), None, None);
    }

    pub fn set_memory(&mut self, key: impl Into<String>, value: StateValue) {
        self.memory.insert(key.into(), value);
    }

    pub fn get_memory(&self, key: &str) -> Option<&StateValue> {
        self.memory.get(key)
    }

    pub fn get_recent_history(&self, n: usize) -> Vec<&HistoryEntry> {
        self.history.iter().rev().take(n).collect()
    }

    fn push_history(
        &mut self,
        change_type: StateChangeType,
        key: String,
        old_value: Option<StateValue>,
        new_value: Option<StateValue>,
    ) {
        self.history.push_back(HistoryEntry {
            timestamp: Utc::now(),
            change_type,
            key,
            old_value,
            new_value,
        });
        while self.history.len() > self.max_history_entries {
            self.history.pop_front();
        }
    }

    /// Builds the on-disk [`AgentStateSnapshot`], keeping only the last
    /// `snapshot_history_entries` history entries (spec §4.4).
    pub fn to_snapshot(&self, snapshot_history_entries: usize) -> AgentStateSnapshot {
        let recent_history: Vec<HistoryEntry> = self
            .history
            .iter()
            .rev()
            .take(snapshot_history_entries)
            .rev()
            .cloned()
            .collect();

        let total_tasks_executed = self
            .get_state("total_tasks_executed")
            .and_then(StateValue::as_i64)
            .unwrap_or(0);
        let failed_tasks = self
            .get_state("failed_tasks")
            .and_then(StateValue::as_i64)
            .unwrap_or(0);
        let last_activity = self
            .get_state("last_activity")
            .and_then(StateValue::as_str)
            .map(str::to_string)
            .unwrap_or_default();

        AgentStateSnapshot {
            version: "1.0".to_string(),
            timestamp: Utc::now(),
            state: self.state.clone(),
            recent_history,
            total_tasks_executed,
            failed_tasks,
            last_activity,
        }
    }

    /// Restores `state` and `history` from a snapshot (spec §4.4
    /// `loadState`). `memory` is never touched — it does not survive
    /// process lifetimes.
    pub fn restore_from_snapshot(&mut self, snapshot: AgentStateSnapshot) {
        self.state = snapshot.state;
        self.history = snapshot.recent_history.into_iter().collect();
    }
}

/// The on-disk form of [`AgentState`] (spec §3, §6). `version` begins at
/// `"1.0"`; an unknown version on load is treated as absent (fresh start),
/// never as a hard error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStateSnapshot {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub state: HashMap<String, StateValue>,
    pub recent_history: Vec<HistoryEntry>,
    pub total_tasks_executed: i64,
    pub failed_tasks: i64,
    pub last_activity: String,
}

impl AgentStateSnapshot {
    pub const CURRENT_VERSION: &'static str = "1.0";

    pub fn is_supported_version(&self) -> bool {
        self.version == Self::CURRENT_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_state_appends_exactly_one_history_entry() {
        let mut state = AgentState::new(100);
        let before = state.history.len();
        state.set_state("x", StateValue::from(42_i64));
        assert_eq!(state.history.len(), before + 1);
        let entry = state.history.back().unwrap();
        assert_eq!(entry.key, "x");
        assert_eq!(entry.new_value.as_ref().and_then(StateValue::as_i64), Some(42));
    }

    #[test]
    fn history_ring_buffer_bounded_at_max_entries() {
        let mut state = AgentState::new(3);
        for i in 0..10 {
            state.set_state("k", StateValue::from(i));
        }
        assert_eq!(state.history.len(), 3);
    }

    #[test]
    fn save_then_load_round_trips_state_and_history() {
        let mut state = AgentState::new(100);
        state.set_state("x", StateValue::from(42_i64));
        let snapshot = state.to_snapshot(100);

        let mut restored = AgentState::new(100);
        restored.restore_from_snapshot(snapshot);

        assert_eq!(restored.get_state("x").and_then(StateValue::as_i64), Some(42));
        assert_eq!(restored.history.len(), 1);
    }

    #[test]
    fn snapshot_history_is_capped_independent_of_full_history() {
        let mut state = AgentState::new(100);
        for i in 0..10 {
            state.set_state("k", StateValue::from(i));
        }
        let snapshot = state.to_snapshot(3);
        assert_eq!(snapshot.recent_history.len(), 3);
        // Newest entries retained, in chronological order.
        assert_eq!(
            snapshot.recent_history.last().unwrap().new_value.as_ref().and_then(StateValue::as_i64),
            Some(9)
        );
    }

    #[test]
    fn memory_is_not_part_of_a_snapshot() {
        let mut state = AgentState::new(10);
        state.set_memory("scratch", StateValue::from("ephemeral"));
        let snapshot = state.to_snapshot(10);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("scratch"));
    }

    #[test]
    fn unsupported_version_is_detected() {
        let mut snapshot_state = AgentState::new(10);
        let mut snapshot = snapshot_state.to_snapshot(10);
        snapshot.version = "99.0".to_string();
        assert!(!snapshot.is_supported_version());
        snapshot_state.set_state("noop", StateValue::from(true));
    }
}
