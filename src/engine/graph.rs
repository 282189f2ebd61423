//! Orchestration graph: router -> handler -> validator -> (router | end)

use tracing::{debug, info};

use super::state::{Feedback, Node, OrchestrationState, ValidationStatus};
use super::Engine;
use crate::error::EngineResult;

impl Engine {
    /// Drive one request through the graph until it reaches `End`.
    ///
    /// Ends when the validator passes or when `attempts` exceeds the retry
    /// bound, so a persistently failing validator gives exactly
    /// `max_retries + 1` handler executions.
    pub async fn run_graph(&self, mut state: OrchestrationState) -> EngineResult<OrchestrationState> {
        let mut node = Node::Router;

        loop {
            debug!("graph: {:?} (attempts {})", node, state.attempts);
            node = match node {
                Node::Router => {
                    let feedback = std::mem::take(&mut state.feedback);
                    let rejection = feedback.rejection().map(str::to_string);

                    let intent = self
                        .classifier
                        .classify(
                            &state.question,
                            state.has_file,
                            &state.file_context,
                            rejection.as_deref(),
                        )
                        .await;
                    info!("🔀 Intent: {} (attempts: {})", intent, state.attempts);

                    state.intent = Some(intent);
                    state.revision_note = rejection;
                    Node::Handler(intent)
                }
                Node::Handler(intent) => {
                    let output = self.handlers.run(intent, &state).await?;
                    state.record(output);
                    Node::Validator
                }
                Node::Validator => {
                    self.apply_validation(&mut state).await;
                    self.after_validation(&state)
                }
                Node::End => return Ok(state),
            };
        }
    }

    async fn apply_validation(&self, state: &mut OrchestrationState) {
        let Some(intent) = state.intent else {
            state.feedback = Feedback::Pass;
            return;
        };

        let verdict = self
            .validator
            .validate(intent, &state.question, &state.context, &state.answer)
            .await;

        state.feedback = match verdict.status {
            ValidationStatus::Pass => Feedback::Pass,
            ValidationStatus::Warning => {
                state.warning = verdict.reason;
                Feedback::Pass
            }
            ValidationStatus::Fail => Feedback::Rejected(verdict.reason.unwrap_or_default()),
        };
    }

    fn after_validation(&self, state: &OrchestrationState) -> Node {
        if state.feedback.is_pass() {
            info!("🏁 Validation passed");
            return Node::End;
        }
        if state.attempts > self.settings.max_retries {
            info!(
                "🛑 Retry limit ({}) reached, returning the last answer",
                self.settings.max_retries
            );
            return Node::End;
        }
        info!("🔙 Answer rejected, routing again");
        Node::Router
    }
}
