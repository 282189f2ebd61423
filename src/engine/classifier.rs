//! Intent Classifier
//!
//! Keyword override first, then one model call, then a fixed fallback.
//! Never fails.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::state::Intent;
use super::truncate_chars;
use crate::error::with_timeout;
use crate::llm::prompt::router_prompt;
use crate::llm::{ChatMessage, LanguageModel};

/// File text shown to the model alongside the question
pub const SNIPPET_CHARS: usize = 300;

/// Regulatory, category and calculation terms
const RULE_KEYWORDS: &[&str] = &[
    "rule",
    "regulation",
    "policy",
    "category",
    "calculation",
    "calculate",
    "formula",
    "규정",
    "계산",
    "기준",
    "분류",
];

/// Table, column and field terms
const SCHEMA_KEYWORDS: &[&str] = &[
    "table", "column", "field", "schema", "테이블", "컬럼", "필드", "스키마",
];

/// ASCII keywords match whole words (plural allowed); Hangul keywords match
/// anywhere since particles attach directly to the noun
fn mentions(lowered: &str, words: &[&str], keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| {
        if kw.is_ascii() {
            words
                .iter()
                .any(|w| w == kw || w.strip_suffix('s') == Some(*kw))
        } else {
            lowered.contains(kw)
        }
    })
}

/// True when the question names both a business rule and a schema object
pub fn requires_cross_check(question: &str) -> bool {
    let lowered = question.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    mentions(&lowered, &words, RULE_KEYWORDS) && mentions(&lowered, &words, SCHEMA_KEYWORDS)
}

pub struct IntentClassifier {
    llm: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub async fn classify(
        &self,
        question: &str,
        has_file: bool,
        file_context: &str,
        feedback: Option<&str>,
    ) -> Intent {
        if requires_cross_check(question) {
            info!("🔀 Rule and schema keywords present, forcing CROSS_CHECK");
            return Intent::CrossCheck;
        }

        let fallback = if has_file {
            Intent::FileOnly
        } else {
            Intent::General
        };

        let snippet = has_file.then(|| truncate_chars(file_context, SNIPPET_CHARS));
        let prompt = router_prompt(question, snippet, feedback);
        let messages = [ChatMessage::user(prompt)];

        match with_timeout("classification", self.timeout, self.llm.chat(&messages)).await {
            Ok(reply) => match Intent::parse_response(&reply) {
                Some(intent) => {
                    debug!("Classifier reply {:?} -> {}", reply.trim(), intent);
                    intent
                }
                None => {
                    warn!("Classifier reply {:?} names no category, using {}", reply.trim(), fallback);
                    fallback
                }
            },
            Err(e) => {
                warn!("Classifier unavailable ({}), using {}", e, fallback);
                fallback
            }
        }
    }
}
