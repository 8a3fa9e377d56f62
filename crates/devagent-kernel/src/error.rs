//! Crate-level error types for `devagent-kernel`.
//!
//! Mirrors the taxonomy in spec §7: each sub-module gets its own typed
//! error, composed here via `#[from]` so `?` converts automatically.
//! Use [`error_stack::Report`] (via [`KernelResult`]) when a caller needs to
//! attach human-readable context as the error propagates.

use thiserror::Error;

/// Crate-level error type for `devagent-kernel`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KernelError {
    /// A goal, plan id, or subtask id referenced something that does not
    /// exist, or a caller supplied an empty/malformed input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The LLM client returned an error or the reply could not be parsed
    /// into the expected structure.
    #[error("LLM error: {0}")]
    Llm(#[from] crate::llm::LlmError),

    /// A configuration error (requires the `config` feature).
    #[cfg(feature = "config")]
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// A low-level I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal error described by a message, used when no more
    /// specific variant applies.
    #[error("{0}")]
    Internal(String),
}

/// Convenience result alias using [`error_stack::Report`].
pub type KernelResult<T> = Result<T, error_stack::Report<KernelError>>;

#[cfg(test)]
mod tests {
    use super::*;
    use error_stack::{Report, ResultExt};

    #[test]
    fn llm_error_converts_via_from() {
        let llm_err = crate::llm::LlmError::Timeout;
        let kernel_err: KernelError = llm_err.into();
        assert!(matches!(kernel_err, KernelError::Llm(_)));
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let kernel_err: KernelError = io_err.into();
        assert!(matches!(kernel_err, KernelError::Io(_)));
    }

    #[test]
    fn internal_error_display() {
        let err = KernelError::Internal("boom".into());
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn report_carries_context() {
        let result: KernelResult<()> = Err(Report::new(KernelError::Internal("root cause".into())))
            .attach("while decomposing goal");
        let report = result.unwrap_err();
        let display = format!("{report:?}");
        assert!(display.contains("root cause"));
        assert!(display.contains("while decomposing goal"));
    }
}
