//! LLM client contract (spec §6).
//!
//! The engine treats the language model as a single external collaborator
//! exposing plain-text `send(prompt) -> text`. The core issues plain-text
//! prompts and parses plain-text replies by markers; it never requires
//! function-calling or streaming from the provider. Concrete providers
//! (OpenAI-compatible, local, …) are out of scope for this crate — only the
//! trait callers code against is defined here, the same split the teacher
//! draws between `mofa-kernel::llm::provider` (trait) and the provider
//! implementations that live in `mofa-foundation`.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors an [`LlmClient`] implementation may surface.
///
/// Deliberately coarse — providers are interchangeable, so callers only
/// need to distinguish "retry later" from "give up", not provider-specific
/// failure modes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LlmError {
    /// The call did not complete within its per-call timeout.
    #[error("LLM call timed out")]
    Timeout,

    /// A transport-level failure (connection refused, DNS, TLS, …).
    #[error("LLM transport error: {0}")]
    Transport(String),

    /// The provider rejected the request (bad API key, rate limit, …).
    #[error("LLM provider error: {0}")]
    Provider(String),
}

/// Result alias for [`LlmClient`] calls.
pub type LlmResult<T> = Result<T, LlmError>;

/// A single capability: turn a prompt into text.
///
/// This is the entire contract the Planning/ReAct Engine and Decision
/// Engine depend on. Implementations bind a specific provider and model at
/// construction time (see `llm.defaultProvider` in the configuration table,
/// spec §6); from the core's perspective every provider looks the same.
#[async_trait]
pub trait LlmClient: Send + Sync + 'static {
    /// Send a single plain-text prompt and return the provider's plain-text
    /// reply, or [`LlmError`] if the call failed or exceeded `timeout`.
    async fn send(&self, prompt: &str, timeout: Duration) -> LlmResult<String>;

    /// Chat-style call for providers that track conversational history
    /// natively. Default implementation folds `system`, `history`, and
    /// `user` into a single prompt and delegates to [`LlmClient::send`], so
    /// implementers only need to override this when their provider offers
    /// a genuine chat endpoint worth using.
    async fn send_chat(
        &self,
        system: &str,
        user: &str,
        history: &[(String, String)],
        timeout: Duration,
    ) -> LlmResult<String> {
        let mut prompt = String::new();
        if !system.is_empty() {
            prompt.push_str(system);
            prompt.push_str("\n\n");
        }
        for (role, text) in history {
            prompt.push_str(&format!("{role}: {text}\n"));
        }
        prompt.push_str("user: ");
        prompt.push_str(user);
        self.send(&prompt, timeout).await
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// A scripted [`LlmClient`] that returns queued replies in order, for
    /// tests that need to drive the Planning/ReAct Engine deterministically
    /// without a real provider.
    pub struct ScriptedLlmClient {
        replies: Mutex<VecDeque<LlmResult<String>>>,
    }

    impl ScriptedLlmClient {
        pub fn new(replies: Vec<&str>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(|s| Ok(s.to_string())).collect()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlmClient {
        async fn send(&self, _prompt: &str, _timeout: Duration) -> LlmResult<String> {
            let mut q = self.replies.lock().await;
            q.pop_front()
                .unwrap_or_else(|| Ok("NO SCRIPTED REPLY LEFT".to_string()))
        }
    }
}
