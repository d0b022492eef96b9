//! Error types for the contextualization pipeline.
//!
//! Per-statement failures (parse errors, iteration-budget exhaustion)
//! are isolated to that statement's result slot by the orchestrator;
//! they never abort sibling tasks. Search backend failures are caught
//! at the `SearchProvider` boundary and degrade to a sentinel string,
//! so they surface here only in logs.

use thiserror::Error;

/// Errors produced by the contextualization pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// No API key was found in configuration or environment.
    #[error("API key missing: set OPENAI_API_KEY or CTX_API_KEY")]
    ApiKeyMissing,

    /// The configured LLM provider name is not supported.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The unrecognized provider name.
        name: String,
    },

    /// An LLM API request failed at the transport level.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error message.
        message: String,
        /// HTTP status code, if available.
        status: Option<u16>,
    },

    /// Model output did not match the expected grammar or schema.
    ///
    /// Covers both the reasoning agent's thought/action grammar and
    /// json-mode classifier responses.
    #[error("failed to parse model output: {message}")]
    ResponseParse {
        /// What went wrong.
        message: String,
        /// The raw model output, kept for diagnostics.
        content: String,
    },

    /// The reasoning loop hit its iteration cap without a final answer.
    #[error("agent exceeded {max_iterations} iterations without a final answer")]
    IterationBudget {
        /// The cap that was exceeded.
        max_iterations: usize,
    },

    /// A search page fetch failed.
    ///
    /// Caught inside [`SearchProvider::search`](crate::search::SearchProvider::search)
    /// and converted to an empty-results sentinel; never reaches the agent loop.
    #[error("search backend error: {message}")]
    SearchBackend {
        /// Backend error message.
        message: String,
    },

    /// A pipeline failure outside agent execution (setup, file loading,
    /// or a fan-out join failure).
    #[error("orchestration error: {message}")]
    Orchestration {
        /// What went wrong.
        message: String,
    },

    /// A persistence operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}
