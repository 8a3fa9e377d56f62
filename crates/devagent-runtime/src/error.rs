//! Crate-level error type for `devagent-runtime`, mapping directly onto
//! the taxonomy in spec §7.

use thiserror::Error;

/// Runtime-level error, composed from every sub-component's typed error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuntimeError {
    /// *User input error* — empty goal, unknown plan id. Rejected at the
    /// API boundary, surfaced to the caller.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// *LLM protocol error* — an unparseable action block or decomposition
    /// reply. The caller already fell back to a safe default; this variant
    /// exists for the warning-level log record, not as a propagated
    /// failure.
    #[error("LLM protocol error: {0}")]
    LlmProtocol(String),

    /// *Transient transport error* — LLM HTTP timeout, shell spawn
    /// interrupted. Routed through the Decision Engine for a retry
    /// verdict rather than surfaced directly.
    #[error("transient error: {0}")]
    Transient(String),

    /// *Action failure* — shell non-zero exit, file missing. Feeds the
    /// reflection phase of the ReAct cycle.
    #[error("action failed: {0}")]
    ActionFailed(String),

    /// *Subtask failure* — reflection said no. Handled by the interactive
    /// failure protocol.
    #[error("subtask failed: {0}")]
    SubtaskFailed(String),

    /// *State persistence error* — snapshot write failed. Logged, the
    /// engine keeps running.
    #[error("state persistence error: {0}")]
    Persistence(String),

    /// *Fatal startup error* — worker pool or state manager failed to
    /// initialise. The controller rolls back and reports.
    #[error("startup failed: {0}")]
    Startup(String),

    #[error(transparent)]
    Kernel(#[from] devagent_kernel::error::KernelError),

    #[error("queue error: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
