//! Ragrouter Library
//!
//! Question-routing retrieval engine - classifies each question into one of
//! eight intents, answers it with a matching retrieval strategy over a rule
//! corpus and a database schema, audits the answer and retries with the
//! auditor's feedback.
//!
//! # Features
//!
//! - **Intent Routing**: keyword override, model classification, safe fallback
//! - **Eight Strategies**: file, version compare, cross check, DB design,
//!   code, schema, rules, general chat
//! - **Bounded Retry**: validator feedback loop with a fixed retry limit
//! - **Session Memory**: bounded per-session history with idle eviction
//! - **Output Sanitizer**: deterministic math/markdown repair
//!
//! # Example
//!
//! ```no_run
//! use ragrouter::{AskRequest, Config, Engine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::from_config(&Config::load()).await?;
//!     let _sweeper = engine.spawn_sweeper();
//!
//!     let response = engine
//!         .handle(AskRequest::new("Which rule decides the fee category table?", "demo"))
//!         .await?;
//!
//!     println!("{}: {}", response.intent, response.answer);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod intake;
pub mod llm;
pub mod memory;
pub mod retrieval;
pub mod sanitize;

// Re-export commonly used types
pub use config::Config;
pub use engine::{AskRequest, AskResponse, Collaborators, Engine, EngineSettings, Intent};
pub use error::{EngineError, EngineResult};
pub use intake::UploadedFile;
pub use memory::{ConversationStore, StoreConfig};
pub use sanitize::Sanitizer;
