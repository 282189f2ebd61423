//! Orchestration state and the closed enums threaded through the graph

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::intake::RequestContext;

/// Question category; selects the retrieval handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    FileOnly,
    VersionCompare,
    CrossCheck,
    DbDesign,
    CodeAnalysis,
    DbSchema,
    RuleDoc,
    General,
}

impl Intent {
    pub const ALL: [Intent; 8] = [
        Intent::FileOnly,
        Intent::VersionCompare,
        Intent::CrossCheck,
        Intent::DbDesign,
        Intent::CodeAnalysis,
        Intent::DbSchema,
        Intent::RuleDoc,
        Intent::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::FileOnly => "FILE_ONLY",
            Intent::VersionCompare => "VERSION_COMPARE",
            Intent::CrossCheck => "CROSS_CHECK",
            Intent::DbDesign => "DB_DESIGN",
            Intent::CodeAnalysis => "CODE_ANALYSIS",
            Intent::DbSchema => "DB_SCHEMA",
            Intent::RuleDoc => "RULE_DOC",
            Intent::General => "GENERAL",
        }
    }

    /// Graph node name of the handler
    pub fn node_name(&self) -> &'static str {
        match self {
            Intent::FileOnly => "file_only",
            Intent::VersionCompare => "version_compare",
            Intent::CrossCheck => "cross_check",
            Intent::DbDesign => "db_design",
            Intent::CodeAnalysis => "code_analysis",
            Intent::DbSchema => "db_schema",
            Intent::RuleDoc => "rule_doc",
            Intent::General => "general",
        }
    }

    /// First whole token of a model reply that names a category.
    ///
    /// Tokens are runs of `[A-Za-z_]` and must match a category name exactly,
    /// so `DB_SCHEMATA` or `general` never match.
    pub fn parse_response(reply: &str) -> Option<Intent> {
        reply
            .split(|c: char| !(c.is_ascii_alphabetic() || c == '_'))
            .filter(|token| !token.is_empty())
            .find_map(|token| token.parse().ok())
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == s)
            .ok_or_else(|| format!("unknown intent: {}", s))
    }
}

/// Validator outcome as seen by the graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Feedback {
    #[default]
    None,
    Pass,
    Rejected(String),
}

impl Feedback {
    pub fn is_pass(&self) -> bool {
        matches!(self, Feedback::Pass)
    }

    pub fn rejection(&self) -> Option<&str> {
        match self {
            Feedback::Rejected(reason) => Some(reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Pass,
    /// Accepted, but the reason is surfaced to the caller
    Warning,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn pass() -> Self {
        Self {
            status: ValidationStatus::Pass,
            reason: None,
        }
    }
}

/// What a handler produced for one attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOutput {
    pub answer: String,
    pub context: String,
    pub sources: Vec<String>,
}

impl HandlerOutput {
    pub fn new(answer: String, context: String, mut sources: Vec<String>) -> Self {
        sources.sort();
        sources.dedup();
        Self {
            answer,
            context,
            sources,
        }
    }
}

/// Graph position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Router,
    Handler(Intent),
    Validator,
    End,
}

/// Mutable record threaded through one request
#[derive(Debug, Clone)]
pub struct OrchestrationState {
    pub question: String,
    pub session_id: String,
    pub file_context: String,
    pub has_file: bool,
    pub filenames: Vec<String>,
    pub intent: Option<Intent>,
    pub answer: String,
    /// Handler executions so far; only ever incremented
    pub attempts: u32,
    pub feedback: Feedback,
    pub context: String,
    pub sources: Vec<String>,
    /// Rejection reason taken by the router for the handler about to run
    pub revision_note: Option<String>,
    pub warning: Option<String>,
}

impl OrchestrationState {
    pub fn new(question: &str, session_id: &str, request: RequestContext) -> Self {
        Self {
            question: question.to_string(),
            session_id: session_id.to_string(),
            file_context: request.file_context,
            has_file: request.has_file,
            filenames: request.filenames,
            intent: None,
            answer: String::new(),
            attempts: 0,
            feedback: Feedback::None,
            context: String::new(),
            sources: Vec::new(),
            revision_note: None,
            warning: None,
        }
    }

    /// Question text for retrieval and generation, carrying the last
    /// rejection reason on a retry
    pub fn effective_question(&self) -> String {
        match &self.revision_note {
            Some(note) if self.attempts > 0 => format!(
                "{}\n[Feedback to reflect]: {}\nPlease improve the answer.",
                self.question, note
            ),
            _ => self.question.clone(),
        }
    }

    /// Filenames for citations, or a placeholder when uploads had no names
    pub fn upload_sources(&self) -> Vec<String> {
        if self.filenames.is_empty() {
            vec!["Uploaded File".to_string()]
        } else {
            self.filenames.clone()
        }
    }

    pub fn record(&mut self, output: HandlerOutput) {
        self.answer = output.answer;
        self.context = output.context;
        self.sources = output.sources;
        self.attempts += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_round_trip_names() {
        for intent in Intent::ALL {
            assert_eq!(intent.as_str().parse::<Intent>().unwrap(), intent);
        }
        assert!("Cross_Check".parse::<Intent>().is_err());
    }

    #[test]
    fn test_parse_response_is_strict() {
        assert_eq!(Intent::parse_response("CROSS_CHECK"), Some(Intent::CrossCheck));
        assert_eq!(Intent::parse_response("6. DB_SCHEMA\n"), Some(Intent::DbSchema));
        assert_eq!(
            Intent::parse_response("The category is: RULE_DOC."),
            Some(Intent::RuleDoc)
        );
        assert_eq!(Intent::parse_response("DB_SCHEMATA"), None);
        assert_eq!(Intent::parse_response("general chat"), None);
        assert_eq!(Intent::parse_response(""), None);
    }

    #[test]
    fn test_effective_question_only_on_retry() {
        let mut state = OrchestrationState::new("fee rule?", "s1", RequestContext::default());
        state.revision_note = Some("not grounded".into());
        assert_eq!(state.effective_question(), "fee rule?");

        state.attempts = 1;
        let q = state.effective_question();
        assert!(q.starts_with("fee rule?\n[Feedback to reflect]: not grounded"));
    }

    #[test]
    fn test_record_increments_attempts() {
        let mut state = OrchestrationState::new("q", "s1", RequestContext::default());
        state.record(HandlerOutput::new(
            "a".into(),
            "ctx".into(),
            vec!["b".into(), "a".into(), "b".into()],
        ));
        assert_eq!(state.attempts, 1);
        assert_eq!(state.sources, vec!["a", "b"]);
    }

    #[test]
    fn test_upload_sources_placeholder() {
        let state = OrchestrationState::new("q", "s1", RequestContext::default());
        assert_eq!(state.upload_sources(), vec!["Uploaded File"]);
    }
}
