//! The search-grounded reasoning loop.
//!
//! Drives a thought / action / observation conversation against an
//! [`LlmProvider`] until the model produces a final answer or the
//! iteration budget runs out. Every model turn must parse as exactly
//! one step; the loop never guesses at malformed output.

use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::message::{ChatRequest, assistant_message, system_message, user_message};
use crate::agent::parser::{ParsedStep, parse_step, strip_code_fences};
use crate::agent::prompt::{SEARCH_TOOL_NAME, build_statement_prompt, contextualizer_system_prompt};
use crate::agent::provider::LlmProvider;
use crate::error::Error;
use crate::search::{CitationRegistry, Renumbered, SearchBackend, SearchProvider, renumber};

/// Stop sequence that keeps the model from inventing its own
/// observations.
const OBSERVATION_STOP: &str = "\nObservation:";

/// A claim to contextualize, with optional attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    pub originator: Option<String>,
    pub date: Option<String>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            originator: None,
            date: None,
        }
    }
}

/// The closed set of tools the reasoning agent may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Search,
}

impl Tool {
    /// Resolves a tool name from model output; anything outside the
    /// closed set is `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            SEARCH_TOOL_NAME => Some(Self::Search),
            _ => None,
        }
    }
}

/// One completed action step of a run.
#[derive(Debug, Clone)]
pub struct AgentStep {
    pub thought: String,
    pub tool: Tool,
    pub input: String,
    pub observation: String,
}

/// The outcome of a full reasoning run.
#[derive(Debug, Clone)]
pub struct AgentRun {
    /// Renumbered final answer with its resolved sources.
    pub answer: Renumbered,
    /// The action steps taken before the final answer.
    pub steps: Vec<AgentStep>,
    /// Model turns consumed, including the final-answer turn.
    pub iterations: usize,
}

/// Search-grounded contextualization agent.
pub struct ReasoningAgent {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_iterations: usize,
    max_tokens: u32,
}

impl ReasoningAgent {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: String,
        max_iterations: usize,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            model,
            max_iterations,
            max_tokens,
        }
    }

    /// Runs the reasoning loop for one statement.
    ///
    /// The citation registry lives for exactly this run, so citation
    /// numbers are stable across the run's queries and meaningless
    /// outside it. Returns [`Error::IterationBudget`] when the model
    /// has not produced a final answer within `max_iterations` turns.
    pub async fn run<B: SearchBackend>(
        &self,
        statement: &Statement,
        search: &mut SearchProvider<B>,
    ) -> Result<AgentRun, Error> {
        let mut registry = CitationRegistry::new();
        let mut messages = vec![
            system_message(contextualizer_system_prompt()),
            user_message(build_statement_prompt(statement)),
        ];
        let mut steps = Vec::new();

        for iteration in 1..=self.max_iterations {
            let request = ChatRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: Some(0.0),
                max_tokens: Some(self.max_tokens),
                json_mode: false,
                stop: vec![OBSERVATION_STOP.to_string()],
            };
            let response = self.provider.chat(&request).await?;
            let content = response.content;

            match parse_step(strip_code_fences(&content))? {
                ParsedStep::FinalAnswer { text, .. } => {
                    info!(iteration, steps = steps.len(), "reasoning run finished");
                    return Ok(AgentRun {
                        answer: renumber(&text, &registry),
                        steps,
                        iterations: iteration,
                    });
                }
                ParsedStep::Action {
                    thought,
                    tool,
                    input,
                } => {
                    let Some(tool) = Tool::from_name(&tool) else {
                        return Err(Error::ResponseParse {
                            message: format!("unknown tool '{tool}'"),
                            content,
                        });
                    };
                    debug!(iteration, ?tool, %input, "agent action");
                    let observation = match tool {
                        Tool::Search => search.search(&input, &mut registry).await,
                    };
                    messages.push(assistant_message(content.clone()));
                    messages.push(user_message(format!(
                        "Observation: {observation}\nThought:"
                    )));
                    steps.push(AgentStep {
                        thought,
                        tool,
                        input,
                        observation,
                    });
                }
            }
        }

        Err(Error::IterationBudget {
            max_iterations: self.max_iterations,
        })
    }
}
