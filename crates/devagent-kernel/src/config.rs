//! Configuration loading (spec §6).
//!
//! Mirrors `mofa-kernel::config`: format auto-detection from the file
//! extension, `${VAR}`/`$VAR` environment substitution, and deserialization
//! via the `config` crate. Feature-gated behind `config` exactly as the
//! teacher gates it, so a caller that only needs [`AgentEngineConfig`]'s
//! field defaults (no file loading) pays no extra compile cost.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The full configuration table from spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentEngineConfig {
    pub agent: AgentSection,
    pub llm: LlmSection,
    pub file_ops: FileOpsSection,
    /// Overrides the OS-default shell used for `SHELL_COMMAND` actions.
    pub execution_shell: Option<String>,
}

impl Default for AgentEngineConfig {
    fn default() -> Self {
        Self {
            agent: AgentSection::default(),
            llm: LlmSection::default(),
            file_ops: FileOpsSection::default(),
            execution_shell: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Gate for starting the engine at all.
    pub mode_enabled: bool,
    /// Worker pool size.
    pub max_concurrent_tasks: usize,
    /// Cycle loop interval, milliseconds.
    pub execution_interval_ms: u64,
    /// Duration to await worker drain on shutdown, milliseconds.
    pub shutdown_timeout_ms: u64,
    pub state_persistence: StatePersistenceSection,
    /// LLM model hint for decision prompts.
    pub decision_model: Option<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            mode_enabled: true,
            max_concurrent_tasks: 4,
            execution_interval_ms: 1_000,
            shutdown_timeout_ms: 30_000,
            state_persistence: StatePersistenceSection::default(),
            decision_model: None,
        }
    }
}

impl AgentSection {
    pub fn execution_interval(&self) -> Duration {
        Duration::from_millis(self.execution_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatePersistenceSection {
    pub enabled: bool,
    /// Relative or absolute path; relative is resolved under the user home.
    pub file_path: String,
    pub backup_interval_ms: u64,
    pub max_history_entries: usize,
}

impl Default for StatePersistenceSection {
    fn default() -> Self {
        Self {
            enabled: true,
            file_path: ".devagent/state.json".to_string(),
            backup_interval_ms: 30_000,
            max_history_entries: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub default_provider: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            default_provider: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOpsSection {
    /// Bytes.
    pub max_read_size: u64,
}

impl Default for FileOpsSection {
    fn default() -> Self {
        Self {
            max_read_size: 10 * 1024 * 1024,
        }
    }
}

#[cfg(feature = "config")]
mod loader {
    use super::AgentEngineConfig;
    use ::config::{Config as Cfg, File, FileFormat};
    use regex::Regex;
    use std::path::Path;

    /// Configuration loading/parsing error.
    #[derive(Debug, thiserror::Error)]
    #[non_exhaustive]
    pub enum ConfigError {
        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),
        #[error("config parsing error: {0}")]
        Parse(String),
        #[error("unsupported format: {0}")]
        UnsupportedFormat(String),
    }

    pub type ConfigResult<T> = Result<T, ConfigError>;

    /// Detect configuration format from the file extension.
    pub fn detect_format(path: &str) -> ConfigResult<FileFormat> {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat("no file extension".to_string()))?;
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(FileFormat::Yaml),
            "toml" => Ok(FileFormat::Toml),
            "json" => Ok(FileFormat::Json),
            "ini" => Ok(FileFormat::Ini),
            "ron" => Ok(FileFormat::Ron),
            "json5" => Ok(FileFormat::Json5),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Substitute `${VAR}` and `$VAR` references with environment variable
    /// values, leaving unresolved references untouched.
    pub fn substitute_env_vars(content: &str) -> String {
        let re_braced = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
        let once = re_braced
            .replace_all(content, |caps: &regex::Captures| {
                std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
            })
            .to_string();
        let re_simple = Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)\b").unwrap();
        re_simple
            .replace_all(&once, |caps: &regex::Captures| {
                std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
            })
            .to_string()
    }

    /// Load an [`AgentEngineConfig`] from `path`, auto-detecting format from
    /// the extension and substituting environment variables first.
    pub fn load_config(path: &str) -> ConfigResult<AgentEngineConfig> {
        let format = detect_format(path)?;
        let content = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&content);
        let cfg = Cfg::builder()
            .add_source(File::from_str(&substituted, format))
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(feature = "config")]
pub use loader::{detect_format, load_config, substitute_env_vars, ConfigError, ConfigResult};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = AgentEngineConfig::default();
        assert_eq!(cfg.agent.max_concurrent_tasks, 4);
        assert_eq!(cfg.agent.execution_interval_ms, 1_000);
        assert_eq!(cfg.agent.shutdown_timeout_ms, 30_000);
        assert_eq!(cfg.agent.state_persistence.max_history_entries, 1_000);
        assert_eq!(cfg.file_ops.max_read_size, 10 * 1024 * 1024);
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = AgentEngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: AgentEngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.agent.max_concurrent_tasks, cfg.agent.max_concurrent_tasks);
    }

    #[cfg(feature = "config")]
    #[test]
    fn detect_format_recognises_known_extensions() {
        assert!(matches!(detect_format("x.toml"), Ok(::config::FileFormat::Toml)));
        assert!(matches!(detect_format("x.yaml"), Ok(::config::FileFormat::Yaml)));
        assert!(detect_format("x.exe").is_err());
    }

    #[cfg(feature = "config")]
    #[test]
    fn substitute_env_vars_replaces_braced_and_bare() {
        std::env::set_var("DEVAGENT_TEST_VAR", "replaced");
        let out = substitute_env_vars("a=${DEVAGENT_TEST_VAR} b=$DEVAGENT_TEST_VAR");
        assert_eq!(out, "a=replaced b=replaced");
    }
}
