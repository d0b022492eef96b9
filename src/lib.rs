//! Propaganda detection and search-grounded contextualization.
//!
//! The pipeline takes article text, classifies propaganda techniques
//! with a json-mode LLM call, then (on request) contextualizes each
//! detected claim through a bounded reasoning loop grounded in web
//! search, with citation numbers resolved to source URLs. A websocket
//! server streams the detection and contextualization results to
//! clients and persists completed analyses to SQLite.

pub mod agent;
pub mod detect;
pub mod error;
pub mod search;
pub mod server;
pub mod storage;

pub use agent::{
    AgentConfig, AnalysisReport, ContextualizeMode, Finding, LlmProvider, Orchestrator,
    ReasoningAgent, Statement,
};
pub use detect::PropagandaDetector;
pub use error::Error;
pub use search::{CitationRegistry, GoogleSearchBackend, SearchProvider};
pub use storage::Storage;
