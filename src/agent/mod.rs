//! Search-grounded contextualization agents.
//!
//! Provides the LLM-powered workflow that turns a detected claim into
//! a sourced contextualization. Uses a pluggable provider abstraction
//! backed by OpenAI-compatible APIs.
//!
//! # Architecture
//!
//! ```text
//! Detection report → Orchestrator
//!   ├── mode Auto → FactualityGate (screens non-factual claims)
//!   ├── Fan-out → one concurrent task per finding
//!   │   └── ReasoningAgent loop:
//!   │       thought → search action → observation … → final answer
//!   ├── Citation renumbering against the run's registry
//!   └── Merge results back onto the report
//! ```

pub mod config;
pub mod gate;
pub mod message;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod reasoning;

// Re-export key types
pub use providers::create_provider;
pub use config::AgentConfig;
pub use gate::FactualityGate;
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use orchestrator::{
    AnalysisReport, ContextualizeMode, ContextualizeStatus, Finding, Orchestrator,
};
pub use parser::ParsedStep;
pub use provider::LlmProvider;
pub use reasoning::{AgentRun, AgentStep, ReasoningAgent, Statement, Tool};
