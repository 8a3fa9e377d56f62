//! `devagent-kernel` — data model, trait contracts and error types for the
//! autonomous coding agent engine.
//!
//! This crate follows the microkernel split the workspace is built around:
//! trait definitions and shared data types live here, concrete
//! implementations (the lifecycle controller, the ReAct engine, the task
//! queue executor, the state manager, the decision engine) live in
//! `devagent-runtime`. `devagent-kernel` has no dependency on a running
//! tokio executor beyond the sync primitives it needs to express its
//! contracts (`tokio::sync::Notify`, timeouts).

pub mod config;
pub mod error;
pub mod llm;
pub mod model;
pub mod tools;

pub mod prelude {
    pub use crate::error::{KernelError, KernelResult};
    pub use crate::llm::{LlmClient, LlmError};
    pub use crate::model::*;
}
