//! Propaganda-technique detection over article text.
//!
//! One json-mode classification call per article. The raw verdict maps
//! technique names to located spans; anything outside the known
//! technique catalogue is dropped with a warning rather than passed
//! through to clients.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::agent::message::{ChatRequest, system_message, user_message};
use crate::agent::orchestrator::{AnalysisReport, Finding};
use crate::agent::parser::strip_code_fences;
use crate::agent::prompt::DETECT_SYSTEM_PROMPT;
use crate::agent::provider::LlmProvider;
use crate::error::Error;

/// The closed catalogue of technique labels the classifier may emit.
pub const KNOWN_TECHNIQUES: [&str; 14] = [
    "Loaded_Language",
    "Name_Calling, Labeling",
    "Repetition",
    "Exaggeration, Minimization",
    "Appeal_to_fear-prejudice",
    "Flag-Waving",
    "Causal_Oversimplification",
    "Appeal_to_Authority",
    "Slogans",
    "Thought-terminating_Cliches",
    "Whataboutism, Straw_Men, Red_Herring",
    "Black-and-White_Fallacy",
    "Bandwagon, Reductio_ad_hitlerum",
    "Doubt",
];

#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    location: String,
}

/// LLM-backed technique classifier.
pub struct PropagandaDetector {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
}

impl PropagandaDetector {
    pub fn new(provider: Arc<dyn LlmProvider>, model: String, max_tokens: u32) -> Self {
        Self {
            provider,
            model,
            max_tokens,
        }
    }

    /// Classifies an article, returning findings grouped by technique.
    pub async fn analyze(&self, text: &str) -> Result<AnalysisReport, Error> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![system_message(DETECT_SYSTEM_PROMPT), user_message(text)],
            temperature: Some(0.0),
            max_tokens: Some(self.max_tokens),
            json_mode: true,
            stop: Vec::new(),
        };
        let response = self.provider.chat(&request).await?;
        let raw: HashMap<String, Vec<RawDetection>> =
            serde_json::from_str(strip_code_fences(&response.content)).map_err(|e| {
                Error::ResponseParse {
                    message: format!("detection verdict is not valid JSON: {e}"),
                    content: response.content.clone(),
                }
            })?;

        let mut report = AnalysisReport::new();
        for (technique, detections) in raw {
            if !KNOWN_TECHNIQUES.contains(&technique.as_str()) {
                warn!(%technique, "unknown technique in detection verdict");
                continue;
            }
            let findings: Vec<Finding> = detections
                .into_iter()
                .map(|detection| {
                    Finding::new(detection.explanation, trim_quotes(&detection.location))
                })
                .collect();
            if !findings.is_empty() {
                report.entry(technique).or_default().extend(findings);
            }
        }
        info!(
            techniques = report.len(),
            findings = report.values().map(Vec::len).sum::<usize>(),
            "article analyzed"
        );
        Ok(report)
    }
}

/// Models sometimes echo spans wrapped in quotation marks.
fn trim_quotes(location: &str) -> String {
    location
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_string()
}
