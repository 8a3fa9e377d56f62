//! Per-[`TaskType`] [`ActionHandler`] implementations (spec §4.3.3).

use crate::error::{RuntimeError, RuntimeResult};
use crate::fs_safety::{self, WriteMode};
use devagent_kernel::llm::LlmClient;
use devagent_kernel::model::{AgentTask, TaskResult};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use super::ActionHandler;

fn require_param<'a>(task: &'a AgentTask, key: &str) -> RuntimeResult<&'a str> {
    task.parameters
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| RuntimeError::ActionFailed(format!("missing parameter '{key}'")))
}

/// The OS default shell per spec §4.3.3: `/bin/zsh` on macOS, `/bin/bash`
/// elsewhere on Unix, `cmd` on Windows.
fn default_shell() -> (&'static str, &'static str) {
    if cfg!(target_os = "macos") {
        ("/bin/zsh", "-c")
    } else if cfg!(target_os = "windows") {
        ("cmd", "/C")
    } else {
        ("/bin/bash", "-c")
    }
}

pub struct ShellCommandHandler {
    pub timeout: Duration,
}

#[async_trait::async_trait]
impl ActionHandler for ShellCommandHandler {
    async fn execute(&self, task: &AgentTask) -> RuntimeResult<TaskResult> {
        let command = require_param(task, "command")?;
        let working_directory = task.parameters.get("working_directory").map(String::as_str);
        let (shell, flag) = default_shell();

        let mut cmd = Command::new(shell);
        cmd.arg(flag).arg(command);
        if let Some(dir) = working_directory {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| RuntimeError::ActionFailed(format!("spawn failed: {e}")))?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RuntimeError::Transient("shell command timed out".into()))?
            .map_err(|e| RuntimeError::ActionFailed(format!("shell command failed: {e}")))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(TaskResult {
            exit_code: output.status.code(),
            output: combined,
            error: if output.status.success() {
                None
            } else {
                Some(format!("exit code {:?}", output.status.code()))
            },
            files_created: Vec::new(),
            commands_executed: vec![command.to_string()],
            duration_ms: 0,
            original_content: None,
        })
    }
}

pub struct FileReadHandler {
    pub max_read_size: usize,
}

#[async_trait::async_trait]
impl ActionHandler for FileReadHandler {
    async fn execute(&self, task: &AgentTask) -> RuntimeResult<TaskResult> {
        let file_path = require_param(task, "file_path")?;
        let mut file = tokio::fs::File::open(file_path)
            .await
            .map_err(|e| RuntimeError::ActionFailed(format!("cannot open {file_path}: {e}")))?;
        let mut buf = Vec::with_capacity(self.max_read_size.min(1 << 20));
        let mut limited = (&mut file).take(self.max_read_size as u64);
        limited
            .read_to_end(&mut buf)
            .await
            .map_err(|e| RuntimeError::ActionFailed(format!("read failed: {e}")))?;
        Ok(TaskResult::success(String::from_utf8_lossy(&buf), 0))
    }
}

pub struct FileWriteHandler {
    pub working_dir: PathBuf,
}

#[async_trait::async_trait]
impl ActionHandler for FileWriteHandler {
    async fn execute(&self, task: &AgentTask) -> RuntimeResult<TaskResult> {
        let file_path = require_param(task, "file_path")?;
        let content = task.parameters.get("content").cloned().unwrap_or_default();
        let mode = match task.parameters.get("mode").map(String::as_str) {
            Some("CREATE") => WriteMode::Create,
            Some("APPEND") => WriteMode::Append,
            Some("REPLACE") => WriteMode::Replace,
            Some("MODIFY") | Some("AUTO") | None => WriteMode::Modify,
            _ => WriteMode::Replace,
        };
        let path = fs_safety::sanitize_path(file_path, &task.description, &self.working_dir);

        // MODIFY/AUTO require reading the file's current content before it
        // is overwritten (spec §4.2.4); a missing file just means there was
        // nothing to preserve.
        let original_content = if mode == WriteMode::Modify {
            fs_safety::read_original(&path).0
        } else {
            None
        };

        fs_safety::write_file(&path, &content, mode)
            .map_err(|e| RuntimeError::ActionFailed(format!("write failed: {e}")))?;
        let absolute = path
            .canonicalize()
            .unwrap_or(path.clone())
            .to_string_lossy()
            .into_owned();
        Ok(TaskResult {
            exit_code: Some(0),
            output: absolute.clone(),
            error: None,
            files_created: vec![absolute],
            commands_executed: Vec::new(),
            duration_ms: 0,
            original_content,
        })
    }
}

pub struct FileCopyHandler;

#[async_trait::async_trait]
impl ActionHandler for FileCopyHandler {
    async fn execute(&self, task: &AgentTask) -> RuntimeResult<TaskResult> {
        let source = require_param(task, "source_path")?;
        let target = require_param(task, "target_path")?;
        let overwrite = task
            .parameters
            .get("overwrite")
            .map(|v| v == "true")
            .unwrap_or(true);
        let create_dir = task
            .parameters
            .get("createDir")
            .map(|v| v == "true")
            .unwrap_or(true);

        if create_dir {
            if let Some(parent) = std::path::Path::new(target).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| RuntimeError::ActionFailed(e.to_string()))?;
                }
            }
        }
        if !overwrite && tokio::fs::try_exists(target).await.unwrap_or(false) {
            return Err(RuntimeError::ActionFailed(format!(
                "target already exists: {target}"
            )));
        }
        tokio::fs::copy(source, target)
            .await
            .map_err(|e| RuntimeError::ActionFailed(format!("copy failed: {e}")))?;
        Ok(TaskResult {
            exit_code: Some(0),
            output: target.to_string(),
            error: None,
            files_created: vec![target.to_string()],
            commands_executed: Vec::new(),
            duration_ms: 0,
            original_content: None,
        })
    }
}

pub struct FileDeleteHandler;

#[async_trait::async_trait]
impl ActionHandler for FileDeleteHandler {
    async fn execute(&self, task: &AgentTask) -> RuntimeResult<TaskResult> {
        let file_path = require_param(task, "file_path")?;
        let metadata = tokio::fs::metadata(file_path)
            .await
            .map_err(|e| RuntimeError::ActionFailed(format!("stat failed: {e}")))?;
        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(file_path).await
        } else {
            tokio::fs::remove_file(file_path).await
        };
        result.map_err(|e| RuntimeError::ActionFailed(format!("delete failed: {e}")))?;
        Ok(TaskResult::success(format!("deleted {file_path}"), 0))
    }
}

/// Shared by [`CodeGenerationHandler`] and [`AiAnalysisHandler`] — both
/// funnel one prompt through the single [`LlmClient`] collaborator.
fn build_client_handler_timeout() -> Duration {
    Duration::from_secs(60)
}

pub struct CodeGenerationHandler {
    pub llm: Arc<dyn LlmClient>,
}

#[async_trait::async_trait]
impl ActionHandler for CodeGenerationHandler {
    async fn execute(&self, task: &AgentTask) -> RuntimeResult<TaskResult> {
        let description = task
            .parameters
            .get("task_description")
            .cloned()
            .unwrap_or_else(|| task.description.clone());
        let language = task
            .parameters
            .get("language")
            .cloned()
            .unwrap_or_else(|| "python".to_string());
        let prompt = format!("Write {language} code for: {description}");
        let reply = self
            .llm
            .send(&prompt, build_client_handler_timeout())
            .await
            .map_err(|e| RuntimeError::Transient(e.to_string()))?;
        Ok(TaskResult::success(reply, 0))
    }
}

pub struct AiAnalysisHandler {
    pub llm: Arc<dyn LlmClient>,
}

#[async_trait::async_trait]
impl ActionHandler for AiAnalysisHandler {
    async fn execute(&self, task: &AgentTask) -> RuntimeResult<TaskResult> {
        let description = task
            .parameters
            .get("task_description")
            .cloned()
            .unwrap_or_else(|| task.description.clone());
        let context = task
            .parameters
            .get("context")
            .cloned()
            .unwrap_or_else(|| "General analysis".to_string());
        let prompt = format!("{description}\n\nContext: {context}");
        let reply = self
            .llm
            .send(&prompt, build_client_handler_timeout())
            .await
            .map_err(|e| RuntimeError::Transient(e.to_string()))?;
        Ok(TaskResult::success(reply, 0))
    }
}

/// Delegates to an external MCP transport. Out of scope for this crate
/// (spec §9 Open Question) — the handler only validates the parameter
/// shape and reports that no transport is configured.
pub struct McpToolCallHandler;

#[async_trait::async_trait]
impl ActionHandler for McpToolCallHandler {
    async fn execute(&self, task: &AgentTask) -> RuntimeResult<TaskResult> {
        let tool_name = require_param(task, "tool_name")?;
        let _tool_arguments = task.parameters.get("tool_arguments");
        Err(RuntimeError::ActionFailed(format!(
            "no MCP transport configured for tool '{tool_name}'"
        )))
    }
}
