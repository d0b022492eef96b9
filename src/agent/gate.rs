//! Pre-contextualization factuality screen.
//!
//! A cheap single-shot classification that decides whether a statement
//! makes a checkable factual claim at all. Opinions, questions and
//! small talk are filtered out before the expensive agent run. The
//! gate fails closed: any provider error or malformed verdict counts
//! as not factual.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::agent::message::{ChatRequest, system_message, user_message};
use crate::agent::parser::strip_code_fences;
use crate::agent::prompt::GATE_SYSTEM_PROMPT;
use crate::agent::provider::LlmProvider;
use crate::error::Error;

#[derive(Debug, Deserialize)]
struct GateVerdict {
    fact_label: serde_json::Value,
}

/// Screens statements for checkable factual content.
pub struct FactualityGate {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
}

impl FactualityGate {
    pub fn new(provider: Arc<dyn LlmProvider>, model: String, max_tokens: u32) -> Self {
        Self {
            provider,
            model,
            max_tokens,
        }
    }

    /// Returns `true` only when the model confidently labels the
    /// statement as a factual claim.
    pub async fn seems_factual(&self, statement: &str) -> bool {
        match self.classify(statement).await {
            Ok(factual) => factual,
            Err(error) => {
                warn!(%error, "factuality gate failed, treating as not factual");
                false
            }
        }
    }

    async fn classify(&self, statement: &str) -> Result<bool, Error> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(GATE_SYSTEM_PROMPT),
                user_message(statement),
            ],
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            json_mode: true,
            stop: Vec::new(),
        };
        let response = self.provider.chat(&request).await?;
        let verdict: GateVerdict = serde_json::from_str(strip_code_fences(&response.content))
            .map_err(|e| Error::ResponseParse {
                message: format!("gate verdict is not valid JSON: {e}"),
                content: response.content.clone(),
            })?;
        let factual = matches!(verdict.fact_label.as_u64(), Some(1))
            || matches!(verdict.fact_label.as_str(), Some("1"));
        debug!(factual, "factuality gate verdict");
        Ok(factual)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::agent::message::{ChatResponse, TokenUsage};

    struct CannedProvider {
        content: String,
        calls: AtomicUsize,
    }

    impl CannedProvider {
        fn new(content: &str) -> Self {
            Self {
                content: content.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse {
                content: self.content.clone(),
                usage: TokenUsage::default(),
                finish_reason: None,
            })
        }
    }

    struct ErroringProvider;

    #[async_trait]
    impl LlmProvider for ErroringProvider {
        fn name(&self) -> &'static str {
            "erroring"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, Error> {
            Err(Error::ApiRequest {
                message: "boom".to_string(),
                status: Some(500),
            })
        }
    }

    fn gate(provider: impl LlmProvider + 'static) -> FactualityGate {
        FactualityGate::new(Arc::new(provider), "test-model".to_string(), 256)
    }

    #[tokio::test]
    async fn test_factual_verdict() {
        let gate = gate(CannedProvider::new(r#"{"fact_label": 1}"#));
        assert!(gate.seems_factual("The unemployment rate doubled in 2020.").await);
    }

    #[tokio::test]
    async fn test_not_factual_verdict() {
        let gate = gate(CannedProvider::new(r#"{"fact_label": 0}"#));
        assert!(!gate.seems_factual("I love mornings.").await);
    }

    #[tokio::test]
    async fn test_string_label_accepted() {
        let gate = gate(CannedProvider::new(r#"{"fact_label": "1"}"#));
        assert!(gate.seems_factual("Water boils at 100 degrees.").await);
    }

    #[tokio::test]
    async fn test_provider_error_fails_closed() {
        let gate = gate(ErroringProvider);
        assert!(!gate.seems_factual("The earth orbits the sun.").await);
    }

    #[tokio::test]
    async fn test_malformed_verdict_fails_closed() {
        let gate = gate(CannedProvider::new("definitely factual"));
        assert!(!gate.seems_factual("Any statement").await);
    }

    #[tokio::test]
    async fn test_fenced_verdict_accepted() {
        let gate = gate(CannedProvider::new(
            "```json\n{\"fact_label\": 1}\n```",
        ));
        assert!(gate.seems_factual("The moon orbits the earth.").await);
    }
}
