//! State Manager (spec §4.4).
//!
//! Owns the in-memory [`AgentState`] behind a `tokio::sync::RwLock` and
//! persists it to a single JSON snapshot file, atomically, on a schedule and
//! on shutdown. Mirrors the teacher's `mofa-foundation` convention of
//! wrapping a kernel-defined data type in a lock and exposing async methods
//! over it, rather than putting any tokio dependency into the data type
//! itself (`devagent_kernel::model::AgentState` stays plain data).

use devagent_kernel::model::{AgentState, AgentStateSnapshot, StateValue};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::RuntimeResult;

/// Thin async façade over [`AgentState`], the unit other components take a
/// handle to.
#[derive(Clone)]
pub struct StateManager {
    state: Arc<RwLock<AgentState>>,
    file_path: Option<PathBuf>,
    snapshot_history_entries: usize,
}

/// Returned by [`StateManager::get_context`] (spec §4.4).
#[derive(Debug, Clone)]
pub struct StateContext {
    pub state: HashMap<String, StateValue>,
    pub memory: HashMap<String, StateValue>,
    pub history_count: usize,
    pub last_updated: Option<String>,
}

impl StateManager {
    /// Loads `file_path` if persistence is enabled and the file exists and
    /// parses; otherwise starts fresh, seeding `agent_id`/`start_time`/zero
    /// counters (spec §4.1 step 3).
    pub async fn init(
        agent_id: impl Into<String>,
        file_path: Option<PathBuf>,
        max_history_entries: usize,
        snapshot_history_entries: usize,
    ) -> Self {
        let mut state = AgentState::new(max_history_entries);

        let loaded = if let Some(path) = &file_path {
            match tokio::fs::read_to_string(path).await {
                Ok(contents) => match serde_json::from_str::<AgentStateSnapshot>(&contents) {
                    Ok(snapshot) if snapshot.is_supported_version() => {
                        state.restore_from_snapshot(snapshot);
                        true
                    }
                    Ok(_) => {
                        tracing::warn!(path = %path.display(), "unsupported snapshot version, starting fresh");
                        false
                    }
                    Err(err) => {
                        tracing::warn!(path = %path.display(), error = %err, "snapshot parse failed, starting fresh");
                        false
                    }
                },
                Err(_) => false,
            }
        } else {
            false
        };

        if !loaded {
            state.seed_fresh(agent_id, chrono::Utc::now());
        }

        Self {
            state: Arc::new(RwLock::new(state)),
            file_path,
            snapshot_history_entries,
        }
    }

    pub async fn set_state(&self, key: impl Into<String>, value: StateValue) {
        self.state.write().await.set_state(key, value);
    }

    pub async fn get_state(&self, key: &str) -> Option<StateValue> {
        self.state.read().await.get_state(key).cloned()
    }

    pub async fn remove_state(&self, key: &str) {
        self.state.write().await.remove_state(key);
    }

    /// Clears both `state` and `memory`, appending one `StateCleared`
    /// history entry (spec §4.4 `clearAll()`).
    pub async fn clear_all(&self) {
        self.state.write().await.clear_all();
    }

    pub async fn set_memory(&self, key: impl Into<String>, value: StateValue) {
        self.state.write().await.set_memory(key, value);
    }

    pub async fn get_memory(&self, key: &str) -> Option<StateValue> {
        self.state.read().await.get_memory(key).cloned()
    }

    /// The most recent `n` history entries, newest first (spec §4.4
    /// `getRecentHistory(n)`).
    pub async fn get_recent_history(&self, n: usize) -> Vec<devagent_kernel::model::HistoryEntry> {
        self.state.read().await.get_recent_history(n).into_iter().cloned().collect()
    }

    /// Adds `completed_delta`/`failed_delta` onto the running
    /// `total_tasks_executed`/`failed_tasks` counters (so they stay
    /// monotone non-decreasing across process lifetimes, per spec §3,
    /// rather than being overwritten by a live queue count that resets to
    /// zero every time completed tasks are purged), sets the live
    /// `pending_tasks` gauge, and increments `cycle_count` — the per-cycle
    /// update the Lifecycle Controller drives (spec §4.1's cycle loop).
    pub async fn record_cycle(&self, completed_delta: i64, failed_delta: i64, pending: i64) {
        let mut guard = self.state.write().await;
        let total = guard
            .get_state("total_tasks_executed")
            .and_then(StateValue::as_i64)
            .unwrap_or(0);
        guard.set_state("total_tasks_executed", StateValue::from(total + completed_delta));
        let failed = guard
            .get_state("failed_tasks")
            .and_then(StateValue::as_i64)
            .unwrap_or(0);
        guard.set_state("failed_tasks", StateValue::from(failed + failed_delta));
        guard.set_state("pending_tasks", StateValue::from(pending));
        let cycle_count = guard
            .get_state("cycle_count")
            .and_then(StateValue::as_i64)
            .unwrap_or(0);
        guard.set_state("cycle_count", StateValue::from(cycle_count + 1));
    }

    /// A read-only summary of everything the state map tracks (spec §4.4
    /// `getContext() -> {state, memory, history_count, last_updated}`).
    pub async fn get_context(&self) -> StateContext {
        let guard = self.state.read().await;
        StateContext {
            state: guard.state.clone(),
            memory: guard.memory.clone(),
            history_count: guard.history.len(),
            last_updated: guard
                .get_state("last_activity")
                .and_then(StateValue::as_str)
                .map(str::to_string),
        }
    }

    /// Writes `state + recentHistory` to `file_path` via temp-file-then-
    /// rename. A no-op (success) if persistence is disabled.
    pub async fn save_state(&self) -> RuntimeResult<()> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        let snapshot = self.state.read().await.to_snapshot(self.snapshot_history_entries);
        write_snapshot_atomically(path, &snapshot).await
    }

    /// On-demand backup to a caller-chosen path, distinct from the
    /// `file_path` the scheduled `save_state()`/`shutdown()` target (spec
    /// §4.4 `backupState()`). A no-op error if persistence is disabled
    /// entirely (no `file_path` was configured at construction), since
    /// there is then no in-memory state worth duplicating to disk.
    pub async fn backup_state(&self, backup_path: &Path) -> RuntimeResult<()> {
        let snapshot = self.state.read().await.to_snapshot(self.snapshot_history_entries);
        write_snapshot_atomically(backup_path, &snapshot).await
    }

    /// Spawns the background snapshot scheduler (spec §4.4: "A background
    /// scheduler runs `saveState()` every `backupInterval`"). Returns a
    /// handle the caller aborts on shutdown.
    pub fn spawn_backup_scheduler(&self, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if let Err(err) = manager.save_state().await {
                    tracing::warn!(error = %err, "periodic state snapshot failed");
                }
            }
        })
    }

    /// Best-effort final save (spec §4.1: "Shutdown is always best-effort:
    /// state-save failure is logged, not thrown").
    pub async fn shutdown(&self) {
        if let Err(err) = self.save_state().await {
            tracing::warn!(error = %err, "final state snapshot on shutdown failed");
        }
    }
}

async fn write_snapshot_atomically(path: &Path, snapshot: &AgentStateSnapshot) -> RuntimeResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let json = serde_json::to_string_pretty(snapshot).map_err(std::io::Error::other)?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        use std::io::Write;
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| std::io::Error::other(e.to_string()))??;
    Ok(())
}
