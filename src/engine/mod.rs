//! Orchestration Engine - routes a question to a retrieval strategy,
//! validates the answer and retries with feedback
//!
//! - [`classifier`]: keyword override, model classification, fallback
//! - [`handlers`]: eight retrieval/generation strategies
//! - [`validator`]: grounding audit with fail-open semantics
//! - [`graph`]: the bounded router/handler/validator loop
//!
//! # Example
//!
//! ```no_run
//! use ragrouter::config::Config;
//! use ragrouter::engine::{AskRequest, Engine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::from_config(&Config::load()).await?;
//!     let response = engine.handle(AskRequest::new("Which table holds fees?", "s1")).await?;
//!     println!("[{}] {}", response.intent, response.answer);
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod classifier;
pub mod graph;
pub mod handlers;
pub mod state;
pub mod validator;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::intake::{self, UploadedFile};
use crate::llm::LanguageModel;
use crate::memory::ConversationStore;
use crate::retrieval::{SchemaSource, VectorIndex};
use crate::sanitize::Sanitizer;

pub use classifier::IntentClassifier;
pub use handlers::Handlers;
pub use state::{Feedback, HandlerOutput, Intent, OrchestrationState};
pub use validator::Validator;

pub const BLOCKED_INTENT: &str = "BLOCKED";
pub const ERROR_INTENT: &str = "ERROR";
pub const BLOCKED_ANSWER: &str = "This question was blocked by the security policy (prompt injection detected).";
pub const ERROR_ANSWER: &str = "A system error occurred while answering. Please try again.";

/// Prefix of `s` holding at most `max` characters
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((at, _)) => &s[..at],
        None => s,
    }
}

// ============================================================================
// Settings & Collaborators
// ============================================================================

/// Resolved engine settings (durations parsed, retries clamped)
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_retries: u32,
    pub collaborator_timeout: Duration,
    pub file_only_budget: usize,
    pub version_compare_budget: usize,
    pub cross_check_file_budget: usize,
    pub min_answer_len: usize,
    pub top_k: usize,
    pub rule_doc_top_k: usize,
    pub schema_browse_top_k: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            max_retries: defaults.max_retries(),
            collaborator_timeout: Duration::from_secs(90),
            file_only_budget: defaults.file_only_budget,
            version_compare_budget: defaults.version_compare_budget,
            cross_check_file_budget: defaults.cross_check_file_budget,
            min_answer_len: defaults.min_answer_len,
            top_k: defaults.top_k,
            rule_doc_top_k: defaults.rule_doc_top_k,
            schema_browse_top_k: defaults.schema_browse_top_k,
        }
    }
}

impl EngineSettings {
    pub fn from_engine_config(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            max_retries: config.max_retries(),
            collaborator_timeout: config.collaborator_timeout()?,
            file_only_budget: config.file_only_budget,
            version_compare_budget: config.version_compare_budget,
            cross_check_file_budget: config.cross_check_file_budget,
            min_answer_len: config.min_answer_len,
            top_k: config.top_k,
            rule_doc_top_k: config.rule_doc_top_k,
            schema_browse_top_k: config.schema_browse_top_k,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.clamp(1, 2);
        self
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }
}

/// External systems the engine talks to
#[derive(Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn LanguageModel>,
    pub rules: Arc<dyn VectorIndex>,
    pub schema: Arc<dyn VectorIndex>,
    pub catalog: Arc<dyn SchemaSource>,
}

// ============================================================================
// Request / Response
// ============================================================================

#[derive(Debug, Clone)]
pub struct AskRequest {
    pub question: String,
    pub session_id: String,
    pub files: Vec<UploadedFile>,
}

impl AskRequest {
    pub fn new(question: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            session_id: session_id.into(),
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: UploadedFile) -> Self {
        self.files.push(file);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskResponse {
    pub intent: String,
    pub answer: String,
    pub sources: Vec<String>,
    /// Validator WARNING reason, when the answer was accepted with one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl AskResponse {
    pub fn blocked() -> Self {
        Self {
            intent: BLOCKED_INTENT.to_string(),
            answer: BLOCKED_ANSWER.to_string(),
            sources: Vec::new(),
            warning: None,
        }
    }

    pub fn error() -> Self {
        Self {
            intent: ERROR_INTENT.to_string(),
            answer: ERROR_ANSWER.to_string(),
            sources: Vec::new(),
            warning: None,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct Engine {
    classifier: IntentClassifier,
    handlers: Handlers,
    validator: Validator,
    memory: Arc<ConversationStore>,
    sanitizer: Sanitizer,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        collaborators: Collaborators,
        memory: Arc<ConversationStore>,
        settings: EngineSettings,
    ) -> Result<Self> {
        let timeout = settings.collaborator_timeout;
        Ok(Self {
            classifier: IntentClassifier::new(Arc::clone(&collaborators.llm), timeout),
            validator: Validator::new(
                Arc::clone(&collaborators.llm),
                timeout,
                settings.min_answer_len,
            ),
            handlers: Handlers {
                llm: collaborators.llm,
                rules: collaborators.rules,
                schema: collaborators.schema,
                catalog: collaborators.catalog,
                memory: Arc::clone(&memory),
                settings: settings.clone(),
            },
            memory,
            sanitizer: Sanitizer::new()?,
            settings,
        })
    }

    pub fn memory(&self) -> &Arc<ConversationStore> {
        &self.memory
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Start the background session eviction sweep
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        Arc::clone(&self.memory).spawn_sweeper()
    }

    /// Answer one request.
    ///
    /// Blocked questions get the fixed BLOCKED response. Other intake errors
    /// (file count, size, format) are returned to the caller. Anything that
    /// fails inside the graph becomes the ERROR response.
    pub async fn handle(&self, request: AskRequest) -> Result<AskResponse, EngineError> {
        info!("🚀 New request (session: {})", request.session_id);

        let context = match intake::prepare(&request.question, &request.files) {
            Ok(context) => context,
            Err(EngineError::SecurityBlocked) => return Ok(AskResponse::blocked()),
            Err(e) => {
                warn!("Request rejected at intake: {}", e);
                return Err(e);
            }
        };

        let state = OrchestrationState::new(&request.question, &request.session_id, context);
        match self.run_graph(state).await {
            Ok(state) => {
                let intent = state.intent.unwrap_or(Intent::General);
                info!(
                    "🤖 Answered as {} after {} attempt(s), {} source(s)",
                    intent,
                    state.attempts,
                    state.sources.len()
                );
                Ok(AskResponse {
                    intent: intent.to_string(),
                    answer: self.sanitizer.sanitize(&state.answer),
                    sources: state.sources,
                    warning: state.warning,
                })
            }
            Err(e) => {
                error!("❌ Orchestration failed: {}", e);
                Ok(AskResponse::error())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("규정문서", 2), "규정");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_settings_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.collaborator_timeout, Duration::from_secs(90));
        assert_eq!(settings.with_max_retries(7).max_retries, 2);
    }

    #[test]
    fn test_fixed_responses() {
        assert_eq!(AskResponse::blocked().intent, "BLOCKED");
        assert!(AskResponse::error().sources.is_empty());
        let json = serde_json::to_string(&AskResponse::error()).unwrap();
        assert!(!json.contains("warning"));
    }
}
