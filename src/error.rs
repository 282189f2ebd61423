//! Error taxonomy shared by the engine, its collaborators and request intake.

use std::time::Duration;

use thiserror::Error;

/// Every failure the engine distinguishes.
///
/// Intake errors (`SecurityBlocked` through `DecodeFailure`) abort the request
/// before the orchestration graph runs. The remaining variants are produced
/// inside the graph; most of them are absorbed by a fallback instead of
/// reaching the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Question matched a prompt-injection pattern
    #[error("query blocked by security policy (prompt injection detected)")]
    SecurityBlocked,

    #[error("too many files: {count} uploaded, at most {max} allowed")]
    TooManyFiles { count: usize, max: usize },

    #[error("file '{name}' is too large ({size}, limit {limit})")]
    InputTooLarge {
        name: String,
        size: String,
        limit: String,
    },

    #[error("file '{name}' has an unsupported format: {detail}")]
    UnsupportedFormat { name: String, detail: String },

    #[error("file '{name}' is an encrypted PDF and cannot be read")]
    DecryptionRequired { name: String },

    #[error("failed to decode '{name}': {detail}")]
    DecodeFailure { name: String, detail: String },

    /// A similarity index failed to load or build, or its search failed
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("generation failed: {0}")]
    GenerationFailure(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("validation inconclusive: {0}")]
    ValidationInconclusive(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Errors caused by the request itself. These are reported back to the
    /// caller as-is and never retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::SecurityBlocked
                | EngineError::TooManyFiles { .. }
                | EngineError::InputTooLarge { .. }
                | EngineError::UnsupportedFormat { .. }
                | EngineError::DecryptionRequired { .. }
                | EngineError::DecodeFailure { .. }
        )
    }

    pub fn generation(err: impl std::fmt::Display) -> Self {
        EngineError::GenerationFailure(err.to_string())
    }

    pub fn retrieval(err: impl std::fmt::Display) -> Self {
        EngineError::RetrievalUnavailable(err.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Run a collaborator future under a deadline, mapping expiry to
/// [`EngineError::Timeout`].
pub async fn with_timeout<T, F>(operation: &'static str, after: Duration, fut: F) -> EngineResult<T>
where
    F: std::future::Future<Output = EngineResult<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout { operation, after }),
    }
}
