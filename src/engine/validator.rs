//! Validator - grades an answer against the context it was built from

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::state::{Intent, ValidationResult, ValidationStatus};
use crate::error::{with_timeout, EngineError};
use crate::llm::prompt::{sandwich, validator_context, VALIDATOR_SYSTEM};
use crate::llm::LanguageModel;

/// Reason used when a FAIL verdict carries none
pub const DEFAULT_REJECTION: &str = "Low quality or security risk";

const STATUS_MARKER: &str = "STATUS:";
const REASON_MARKER: &str = "REASON:";

pub struct Validator {
    llm: Arc<dyn LanguageModel>,
    timeout: Duration,
    min_answer_len: usize,
}

impl Validator {
    pub fn new(llm: Arc<dyn LanguageModel>, timeout: Duration, min_answer_len: usize) -> Self {
        Self {
            llm,
            timeout,
            min_answer_len,
        }
    }

    /// Audit calls carry no history and are not recorded in any session
    pub async fn validate(
        &self,
        intent: Intent,
        question: &str,
        context: &str,
        answer: &str,
    ) -> ValidationResult {
        if intent == Intent::General || answer.chars().count() < self.min_answer_len {
            return ValidationResult::pass();
        }

        let messages = sandwich(
            VALIDATOR_SYSTEM,
            &validator_context(question, context, answer),
            &[],
            "Evaluate this answer",
        );

        match with_timeout("validation", self.timeout, self.llm.chat(&messages)).await {
            Ok(reply) => parse_verdict(&reply),
            Err(e) => {
                let e = EngineError::ValidationInconclusive(e.to_string());
                warn!("{}, accepting the answer", e);
                ValidationResult::pass()
            }
        }
    }
}

/// Read `STATUS: <PASS|WARNING|FAIL>` and the text after the last `REASON:`.
///
/// Without a status line the first word of the reply is used. Anything
/// unrecognised is a pass.
pub fn parse_verdict(reply: &str) -> ValidationResult {
    let status_word = reply
        .lines()
        .find_map(|line| {
            line.find(STATUS_MARKER)
                .map(|at| line[at + STATUS_MARKER.len()..].to_string())
        })
        .unwrap_or_else(|| reply.to_string());

    let token: String = status_word
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_uppercase();

    let status = match token.as_str() {
        "FAIL" => ValidationStatus::Fail,
        "WARNING" => ValidationStatus::Warning,
        _ => ValidationStatus::Pass,
    };

    let reason = reply
        .rfind(REASON_MARKER)
        .map(|at| reply[at + REASON_MARKER.len()..].trim().to_string())
        .filter(|r| !r.is_empty());

    match status {
        ValidationStatus::Fail => {
            let reason = reason.unwrap_or_else(|| DEFAULT_REJECTION.to_string());
            info!("⚠️ Validator rejected the answer: {}", reason);
            ValidationResult {
                status,
                reason: Some(reason),
            }
        }
        ValidationStatus::Warning => ValidationResult { status, reason },
        ValidationStatus::Pass => ValidationResult::pass(),
    }
}
