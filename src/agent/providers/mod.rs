//! Concrete [`LlmProvider`] implementations and the name-keyed factory.

pub mod openai;

use std::sync::Arc;

use crate::agent::config::AgentConfig;
use crate::agent::provider::LlmProvider;
use crate::error::Error;

pub use openai::OpenAiProvider;

/// Creates the [`LlmProvider`] named by `config.provider`, shared so
/// the detector, gate, and contextualization tasks can all clone it.
///
/// Only `"openai"` is wired up today; the match arm is the extension
/// point for further backends.
///
/// # Errors
///
/// Returns [`Error::UnsupportedProvider`] for unknown provider names.
pub fn create_provider(config: &AgentConfig) -> Result<Arc<dyn LlmProvider>, Error> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config))),
        other => Err(Error::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}
