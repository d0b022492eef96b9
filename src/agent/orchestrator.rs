//! Fan-out of contextualization work across a detection report.
//!
//! Each finding in a report becomes one independent task. Tasks share
//! the LLM provider but own their search state, so citation numbers
//! never leak between findings. A failed task marks only its own
//! finding; the report always comes back with every finding present.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::agent::config::AgentConfig;
use crate::agent::gate::FactualityGate;
use crate::agent::provider::LlmProvider;
use crate::agent::reasoning::{ReasoningAgent, Statement};
use crate::search::{SearchBackend, SearchProvider};

/// Annotation used when the auto gate screens a finding out.
pub const NOT_FACTUAL: &str = "Not factual";

/// Detection report: technique name to the findings under it.
pub type AnalysisReport = BTreeMap<String, Vec<Finding>>;

/// Whether and how findings get contextualized.
///
/// The wire form mirrors the request contract: `true` for `Always`,
/// `false` for `Off`, the string `"Auto"` for gated contextualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextualizeMode {
    Always,
    Auto,
    #[default]
    Off,
}

impl Serialize for ContextualizeMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Always => serializer.serialize_bool(true),
            Self::Off => serializer.serialize_bool(false),
            Self::Auto => serializer.serialize_str("Auto"),
        }
    }
}

impl<'de> Deserialize<'de> for ContextualizeMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ModeVisitor;

        impl Visitor<'_> for ModeVisitor {
            type Value = ContextualizeMode;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("true, false, or the string \"Auto\"")
            }

            fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
                Ok(if value {
                    ContextualizeMode::Always
                } else {
                    ContextualizeMode::Off
                })
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                if value == "Auto" {
                    Ok(ContextualizeMode::Auto)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(value), &self))
                }
            }
        }

        deserializer.deserialize_any(ModeVisitor)
    }
}

/// Little status marker on each finding after contextualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextualizeStatus {
    Success,
    Error,
}

/// One detected technique occurrence, plus its contextualization once
/// the orchestrator has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub explanation: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub contextualize_status: Option<ContextualizeStatus>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub contextualize: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub contextualize_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sources: Option<BTreeMap<usize, String>>,
}

impl Finding {
    pub fn new(explanation: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            explanation: explanation.into(),
            location: location.into(),
            contextualize_status: None,
            contextualize: None,
            contextualize_error: None,
            sources: None,
        }
    }
}

/// What one finding task resolved to.
#[derive(Debug)]
struct Outcome {
    status: ContextualizeStatus,
    contextualize: Option<String>,
    error: Option<String>,
    sources: Option<BTreeMap<usize, String>>,
}

impl Outcome {
    fn success(text: String, sources: BTreeMap<usize, String>) -> Self {
        Self {
            status: ContextualizeStatus::Success,
            contextualize: Some(text),
            error: None,
            sources: Some(sources),
        }
    }

    fn not_factual() -> Self {
        Self {
            status: ContextualizeStatus::Success,
            contextualize: Some(NOT_FACTUAL.to_string()),
            error: None,
            sources: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            status: ContextualizeStatus::Error,
            contextualize: None,
            error: Some(message),
            sources: None,
        }
    }

    fn apply(self, finding: &mut Finding) {
        finding.contextualize_status = Some(self.status);
        finding.contextualize = self.contextualize;
        finding.contextualize_error = self.error;
        finding.sources = self.sources;
    }
}

/// Runs contextualization over a whole report.
pub struct Orchestrator<B> {
    provider: Arc<dyn LlmProvider>,
    backend: B,
    config: Arc<AgentConfig>,
}

impl<B> Orchestrator<B>
where
    B: SearchBackend + Clone + Send + Sync + 'static,
{
    pub fn new(provider: Arc<dyn LlmProvider>, backend: B, config: Arc<AgentConfig>) -> Self {
        Self {
            provider,
            backend,
            config,
        }
    }

    /// Contextualizes every finding in `report` in place.
    ///
    /// Returns `false` without touching the report when the mode is
    /// `Off`. Otherwise annotates each finding with a status and
    /// either an answer or an error message. Task panics and timeouts
    /// are confined to the finding that caused them.
    pub async fn contextualize_report(
        &self,
        mode: ContextualizeMode,
        report: &mut AnalysisReport,
    ) -> bool {
        if mode == ContextualizeMode::Off {
            return false;
        }

        let mut handles: Vec<(String, usize, JoinHandle<Outcome>)> = Vec::new();
        for (technique, findings) in report.iter() {
            for (index, finding) in findings.iter().enumerate() {
                let handle = self.spawn_task(mode, finding.location.clone());
                handles.push((technique.clone(), index, handle));
            }
        }
        info!(tasks = handles.len(), ?mode, "contextualization fan-out");

        for (technique, index, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    error!(%technique, index, %join_error, "contextualization task aborted");
                    Outcome::failed(format!("task aborted: {join_error}"))
                }
            };
            if let Some(finding) = report
                .get_mut(&technique)
                .and_then(|findings| findings.get_mut(index))
            {
                outcome.apply(finding);
            }
        }
        true
    }

    fn spawn_task(&self, mode: ContextualizeMode, location: String) -> JoinHandle<Outcome> {
        let provider = Arc::clone(&self.provider);
        let backend = self.backend.clone();
        let config = Arc::clone(&self.config);
        tokio::spawn(async move {
            contextualize_one(mode, location, provider, backend, &config).await
        })
    }
}

async fn contextualize_one<B: SearchBackend>(
    mode: ContextualizeMode,
    location: String,
    provider: Arc<dyn LlmProvider>,
    backend: B,
    config: &AgentConfig,
) -> Outcome {
    if mode == ContextualizeMode::Auto {
        let gate = FactualityGate::new(
            Arc::clone(&provider),
            config.model.clone(),
            config.gate_max_tokens,
        );
        if !gate.seems_factual(&location).await {
            return Outcome::not_factual();
        }
    }

    let agent = ReasoningAgent::new(
        provider,
        config.model.clone(),
        config.max_iterations,
        config.agent_max_tokens,
    );
    let mut search = SearchProvider::new(backend, config.page_size, config.excluded_domains.clone());
    let statement = Statement::new(location);

    match tokio::time::timeout(config.timeout, agent.run(&statement, &mut search)).await {
        Ok(Ok(run)) => Outcome::success(run.answer.text, run.answer.sources),
        Ok(Err(error)) => {
            warn!(%error, "contextualization run failed");
            Outcome::failed(error.to_string())
        }
        Err(_) => {
            warn!("contextualization run timed out");
            Outcome::failed("contextualization timed out".to_string())
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::agent::message::{ChatRequest, ChatResponse, TokenUsage};
    use crate::error::Error;
    use crate::search::SearchResult;

    /// Deterministic provider: gate requests (json mode) get a fixed
    /// verdict, reasoning requests get a search turn then a final
    /// answer, tracked per conversation length.
    struct FakeProvider {
        factual: bool,
        agent_calls: AtomicUsize,
        gate_calls: AtomicUsize,
        fail_reasoning: bool,
    }

    impl FakeProvider {
        fn new(factual: bool) -> Self {
            Self {
                factual,
                agent_calls: AtomicUsize::new(0),
                gate_calls: AtomicUsize::new(0),
                fail_reasoning: false,
            }
        }

        fn failing() -> Self {
            Self {
                factual: true,
                agent_calls: AtomicUsize::new(0),
                gate_calls: AtomicUsize::new(0),
                fail_reasoning: true,
            }
        }
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, Error> {
            if request.json_mode {
                self.gate_calls.fetch_add(1, Ordering::SeqCst);
                let label = u8::from(self.factual);
                return Ok(ChatResponse {
                    content: format!(r#"{{"fact_label": {label}}}"#),
                    usage: TokenUsage::default(),
                    finish_reason: None,
                });
            }
            self.agent_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_reasoning {
                return Err(Error::ApiRequest {
                    message: "provider unavailable".to_string(),
                    status: Some(503),
                });
            }
            // First reasoning turn of a conversation has exactly two
            // messages; later turns carry the appended observation.
            let content = if request.messages.len() == 2 {
                "Thought: check the claim\nAction: search\nAction Input: the claim".to_string()
            } else {
                "Thought: settled\nFinal Answer: Context: contradicted by reporting [1] and [2].\nSources:\n- [1] First report\n- [2] Second report\n".to_string()
            };
            Ok(ChatResponse {
                content,
                usage: TokenUsage::default(),
                finish_reason: None,
            })
        }
    }

    #[derive(Clone)]
    struct TwoResultBackend {
        calls: Arc<AtomicUsize>,
    }

    impl TwoResultBackend {
        fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl SearchBackend for TwoResultBackend {
        async fn fetch(
            &self,
            _query: &str,
            _count: usize,
            offset: usize,
        ) -> Result<Vec<SearchResult>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if offset > 0 {
                return Ok(Vec::new());
            }
            Ok(vec![
                SearchResult {
                    url: "https://first.example/a".to_string(),
                    title: "First".to_string(),
                    snippet: "Evidence A".to_string(),
                    published: None,
                },
                SearchResult {
                    url: "https://second.example/b".to_string(),
                    title: "Second".to_string(),
                    snippet: "Evidence B".to_string(),
                    published: None,
                },
            ])
        }
    }

    fn config() -> Arc<AgentConfig> {
        Arc::new(
            AgentConfig::builder()
                .api_key("test-key")
                .build()
                .unwrap_or_else(|e| panic!("config build failed: {e}")),
        )
    }

    fn report_with(locations: &[&str]) -> AnalysisReport {
        let mut report = AnalysisReport::new();
        report.insert(
            "Loaded_Language".to_string(),
            locations
                .iter()
                .map(|location| Finding::new("charged wording", *location))
                .collect(),
        );
        report
    }

    #[tokio::test]
    async fn test_off_mode_leaves_report_untouched() {
        let provider = Arc::new(FakeProvider::new(true));
        let orchestrator = Orchestrator::new(
            provider.clone(),
            TwoResultBackend::new(),
            config(),
        );
        let mut report = report_with(&["a claim"]);
        let before = report.clone();

        let ran = orchestrator
            .contextualize_report(ContextualizeMode::Off, &mut report)
            .await;

        assert!(!ran);
        assert_eq!(report, before);
        assert_eq!(provider.agent_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_always_contextualizes_every_finding() {
        let provider = Arc::new(FakeProvider::new(true));
        let backend = TwoResultBackend::new();
        let orchestrator = Orchestrator::new(provider.clone(), backend.clone(), config());
        let mut report = report_with(&["first claim", "second claim"]);

        let ran = orchestrator
            .contextualize_report(ContextualizeMode::Always, &mut report)
            .await;

        assert!(ran);
        // Always mode never consults the gate.
        assert_eq!(provider.gate_calls.load(Ordering::SeqCst), 0);
        let findings = &report["Loaded_Language"];
        for finding in findings {
            assert_eq!(
                finding.contextualize_status,
                Some(ContextualizeStatus::Success)
            );
            let text = finding
                .contextualize
                .as_deref()
                .unwrap_or_else(|| panic!("missing contextualization"));
            assert!(text.contains("[1]"));
            assert!(text.contains("[2]"));
            let sources = finding
                .sources
                .as_ref()
                .unwrap_or_else(|| panic!("missing sources"));
            assert_eq!(
                sources.get(&1).map(String::as_str),
                Some("https://first.example/a")
            );
            assert_eq!(
                sources.get(&2).map(String::as_str),
                Some("https://second.example/b")
            );
        }
    }

    #[tokio::test]
    async fn test_auto_gate_screens_out_non_factual() {
        let provider = Arc::new(FakeProvider::new(false));
        let backend = TwoResultBackend::new();
        let orchestrator = Orchestrator::new(provider.clone(), backend.clone(), config());
        let mut report = report_with(&["just an opinion"]);

        orchestrator
            .contextualize_report(ContextualizeMode::Auto, &mut report)
            .await;

        let finding = &report["Loaded_Language"][0];
        assert_eq!(
            finding.contextualize_status,
            Some(ContextualizeStatus::Success)
        );
        assert_eq!(finding.contextualize.as_deref(), Some(NOT_FACTUAL));
        assert!(finding.sources.is_none());
        // The screened-out finding never reaches the agent or the web.
        assert_eq!(provider.agent_calls.load(Ordering::SeqCst), 0);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auto_gate_passes_factual_through() {
        let provider = Arc::new(FakeProvider::new(true));
        let orchestrator = Orchestrator::new(provider.clone(), TwoResultBackend::new(), config());
        let mut report = report_with(&["a checkable claim"]);

        orchestrator
            .contextualize_report(ContextualizeMode::Auto, &mut report)
            .await;

        assert_eq!(provider.gate_calls.load(Ordering::SeqCst), 1);
        let finding = &report["Loaded_Language"][0];
        assert_eq!(
            finding.contextualize_status,
            Some(ContextualizeStatus::Success)
        );
    }

    #[tokio::test]
    async fn test_failed_run_marks_only_its_finding() {
        let provider = Arc::new(FakeProvider::failing());
        let orchestrator = Orchestrator::new(provider, TwoResultBackend::new(), config());
        let mut report = report_with(&["doomed claim"]);

        let ran = orchestrator
            .contextualize_report(ContextualizeMode::Always, &mut report)
            .await;

        assert!(ran);
        let finding = &report["Loaded_Language"][0];
        assert_eq!(
            finding.contextualize_status,
            Some(ContextualizeStatus::Error)
        );
        assert!(finding.contextualize.is_none());
        let message = finding
            .contextualize_error
            .as_deref()
            .unwrap_or_else(|| panic!("missing error message"));
        assert!(message.contains("provider unavailable"));
    }

    #[test]
    fn test_mode_wire_format() {
        let always: ContextualizeMode =
            serde_json::from_str("true").unwrap_or_else(|e| panic!("parse failed: {e}"));
        let off: ContextualizeMode =
            serde_json::from_str("false").unwrap_or_else(|e| panic!("parse failed: {e}"));
        let auto: ContextualizeMode =
            serde_json::from_str(r#""Auto""#).unwrap_or_else(|e| panic!("parse failed: {e}"));
        assert_eq!(always, ContextualizeMode::Always);
        assert_eq!(off, ContextualizeMode::Off);
        assert_eq!(auto, ContextualizeMode::Auto);
        assert!(serde_json::from_str::<ContextualizeMode>(r#""sometimes""#).is_err());

        assert_eq!(
            serde_json::to_string(&ContextualizeMode::Always)
                .unwrap_or_else(|e| panic!("serialize failed: {e}")),
            "true"
        );
        assert_eq!(
            serde_json::to_string(&ContextualizeMode::Auto)
                .unwrap_or_else(|e| panic!("serialize failed: {e}")),
            r#""Auto""#
        );
    }

    #[test]
    fn test_finding_serialization_skips_empty_fields() {
        let finding = Finding::new("why", "where");
        let json =
            serde_json::to_string(&finding).unwrap_or_else(|e| panic!("serialize failed: {e}"));
        assert!(!json.contains("contextualize_status"));
        assert!(!json.contains("sources"));
        assert!(json.contains(r#""location":"where""#));
    }
}
