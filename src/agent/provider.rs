//! Pluggable LLM provider trait.
//!
//! Implementations translate provider-agnostic [`ChatRequest`]/[`ChatResponse`]
//! into provider-specific SDK calls. This keeps all agent logic decoupled
//! from any particular LLM vendor. Providers are stateless per invocation,
//! so a single instance may be shared across concurrent agent runs.

use async_trait::async_trait;

use super::message::{ChatRequest, ChatResponse};
use crate::error::Error;

/// Trait for LLM provider backends.
///
/// Implementations handle the transport layer (HTTP, SDK calls, retries)
/// for a specific provider while presenting a uniform interface to the
/// reasoning agent, the factuality gate, and the propaganda detector.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g., `"openai"`).
    fn name(&self) -> &'static str;

    /// Executes a chat completion request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ApiRequest`] on API failures or timeouts.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, Error>;
}
