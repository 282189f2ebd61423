//! Retrieval Handlers - one strategy per intent
//!
//! Every handler retrieves, assembles a bounded context, generates through
//! [`Handlers::generate`] and derives its citations. Retrieval failures
//! degrade to an empty result; generation failures propagate.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::state::{HandlerOutput, Intent, OrchestrationState};
use super::{truncate_chars, EngineSettings};
use crate::error::{with_timeout, EngineResult};
use crate::llm::prompt::{self, sandwich, sql_context};
use crate::llm::{ChatMessage, LanguageModel};
use crate::memory::ConversationStore;
use crate::retrieval::{
    citations, join_content, MetadataFilter, RetrievedDocument, SchemaSource, VectorIndex,
    META_TYPE,
};

/// Output of the SQL draft when it tries to modify data
pub const SQL_SECURITY_VIOLATION: &str = "SQL_SECURITY_VIOLATION";

/// Statements the SQL draft may never contain
const FORBIDDEN_SQL: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "GRANT", "REVOKE", "TRUNCATE", "MERGE",
    "CREATE",
];

/// Lexical markers of a SQL-generation request
const SQL_REQUEST_KEYWORDS: &[&str] = &["sql", "쿼리", "select", "ddl"];

/// Retrieval query for version_compare when the question is too short to search on
const SHORT_QUESTION_QUERY: &str = "change";
const SHORT_QUESTION_CHARS: usize = 5;

/// True when `sql` contains a data-modifying statement as a whole word
pub fn is_modifying_sql(sql: &str) -> bool {
    sql.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| FORBIDDEN_SQL.contains(&word.to_uppercase().as_str()))
}

pub fn guard_sql(draft: String) -> String {
    if is_modifying_sql(&draft) {
        warn!("🚫 SQL draft contained a data-modifying statement, replaced");
        SQL_SECURITY_VIOLATION.to_string()
    } else {
        draft
    }
}

pub fn is_sql_request(question: &str) -> bool {
    let lowered = question.to_lowercase();
    SQL_REQUEST_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

pub struct Handlers {
    pub(super) llm: Arc<dyn LanguageModel>,
    pub(super) rules: Arc<dyn VectorIndex>,
    pub(super) schema: Arc<dyn VectorIndex>,
    pub(super) catalog: Arc<dyn SchemaSource>,
    pub(super) memory: Arc<ConversationStore>,
    pub(super) settings: EngineSettings,
}

impl Handlers {
    fn timeout(&self) -> Duration {
        self.settings.collaborator_timeout
    }

    pub async fn run(&self, intent: Intent, state: &OrchestrationState) -> EngineResult<HandlerOutput> {
        if state.attempts == 0 {
            info!("▶️ Running {}", intent.node_name());
        } else {
            info!("🔄 Retry {}: running {}", state.attempts, intent.node_name());
        }

        match intent {
            Intent::FileOnly => self.file_only(state).await,
            Intent::VersionCompare => self.version_compare(state).await,
            Intent::CrossCheck => self.cross_check(state).await,
            Intent::DbDesign => self.db_design(state).await,
            Intent::CodeAnalysis => self.code_analysis(state).await,
            Intent::DbSchema => self.db_schema(state).await,
            Intent::RuleDoc => self.rule_doc(state).await,
            Intent::General => self.general(state).await,
        }
    }

    // ------------------------------------------------------------------
    // Collaborator calls
    // ------------------------------------------------------------------

    /// Sandwiched generation with the session's history; the exchange is
    /// appended to the session afterwards
    async fn generate(
        &self,
        system: &str,
        context: &str,
        question: &str,
        session_id: &str,
    ) -> EngineResult<String> {
        let history = self.memory.get_or_create(session_id);
        let messages = sandwich(system, context, &history, question);

        let answer = with_timeout("generation", self.timeout(), self.llm.chat(&messages)).await?;
        self.memory.append_turn(session_id, question, &answer);
        Ok(answer)
    }

    async fn search(
        &self,
        index: &dyn VectorIndex,
        label: &str,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<RetrievedDocument> {
        match with_timeout("retrieval", self.timeout(), index.search(query, k, filter)).await {
            Ok(docs) => {
                debug!("{} search returned {} document(s)", label, docs.len());
                docs
            }
            Err(e) => {
                warn!("⚠️ {} search failed, continuing without it: {}", label, e);
                Vec::new()
            }
        }
    }

    async fn search_rules(&self, query: &str, k: usize) -> Vec<RetrievedDocument> {
        self.search(self.rules.as_ref(), "rule", query, k, None).await
    }

    async fn search_schema(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<RetrievedDocument> {
        self.search(self.schema.as_ref(), "schema", query, k, filter).await
    }

    /// One keyword for the catalog lookup, or None when the model finds none
    async fn extract_keyword(&self, question: &str) -> Option<String> {
        let messages = [ChatMessage::user(prompt::keyword_prompt(question))];
        match with_timeout("keyword extraction", self.timeout(), self.llm.chat(&messages)).await {
            Ok(reply) => {
                let keyword = reply.trim().trim_matches(|c| c == '"' || c == '\'').trim();
                if keyword.is_empty() || keyword.eq_ignore_ascii_case("FALSE") {
                    None
                } else {
                    Some(keyword.to_string())
                }
            }
            Err(e) => {
                warn!("Keyword extraction failed: {}", e);
                None
            }
        }
    }

    async fn keyword_search(&self, keyword: &str) -> Option<String> {
        match with_timeout("keyword search", self.timeout(), self.catalog.search_by_keyword(keyword)).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("⚠️ Schema keyword search failed: {}", e);
                None
            }
        }
    }

    async fn draft_sql(
        &self,
        question: &str,
        rule_context: &str,
        schema_context: &str,
        session_id: &str,
    ) -> EngineResult<String> {
        let context = sql_context(question, rule_context, schema_context);
        let draft = self
            .generate(prompt::SQL_SYSTEM, &context, question, session_id)
            .await?;
        Ok(guard_sql(draft))
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    async fn file_only(&self, state: &OrchestrationState) -> EngineResult<HandlerOutput> {
        let question = state.effective_question();
        let budget = self.settings.file_only_budget;
        let context = if state.file_context.chars().count() > budget {
            format!("{}...", truncate_chars(&state.file_context, budget))
        } else {
            state.file_context.clone()
        };

        let answer = self
            .generate(prompt::FILE_SYSTEM, &context, &question, &state.session_id)
            .await?;
        Ok(HandlerOutput::new(answer, context, state.upload_sources()))
    }

    async fn version_compare(&self, state: &OrchestrationState) -> EngineResult<HandlerOutput> {
        let question = state.effective_question();
        let query = if question.chars().count() > SHORT_QUESTION_CHARS {
            question.as_str()
        } else {
            SHORT_QUESTION_QUERY
        };

        let old_docs = self.search_rules(query, self.settings.top_k).await;
        let context = format!(
            "[OLD Rules]\n{}\n\n[NEW File]\n{}...",
            join_content(&old_docs),
            truncate_chars(&state.file_context, self.settings.version_compare_budget)
        );

        let mut sources = citations(&old_docs);
        sources.extend(state.upload_sources());

        let answer = self
            .generate(prompt::VERSION_COMPARE_SYSTEM, &context, &question, &state.session_id)
            .await?;
        Ok(HandlerOutput::new(answer, context, sources))
    }

    async fn cross_check(&self, state: &OrchestrationState) -> EngineResult<HandlerOutput> {
        let question = state.effective_question();
        let k = self.settings.top_k;

        let (rule_docs, schema_docs) =
            tokio::join!(self.search_rules(&question, k), self.search_schema(&question, k, None));

        let rule_context = join_content(&rule_docs);
        let mut schema_context = join_content(&schema_docs);

        if let Some(keyword) = self.extract_keyword(&question).await {
            debug!("cross_check keyword: {}", keyword);
            if let Some(found) = self.keyword_search(&keyword).await {
                schema_context.push('\n');
                schema_context.push_str(&found);
            }
        }

        let file_section = if state.file_context.is_empty() {
            String::new()
        } else {
            format!(
                "[FILE]\n{}",
                truncate_chars(&state.file_context, self.settings.cross_check_file_budget)
            )
        };
        let context = format!(
            "{}\n\n[Rules]\n{}\n\n[DB Schema]\n{}",
            file_section, rule_context, schema_context
        );

        let mut sources = citations(&[rule_docs, schema_docs].concat());
        if !state.file_context.is_empty() {
            sources.extend(state.upload_sources());
        }

        let answer = self
            .generate(prompt::CROSS_CHECK_SYSTEM, &context, &question, &state.session_id)
            .await?;
        Ok(HandlerOutput::new(answer, context, sources))
    }

    async fn db_design(&self, state: &OrchestrationState) -> EngineResult<HandlerOutput> {
        let question = state.effective_question();
        let k = self.settings.top_k;

        let (rule_docs, schema_docs) =
            tokio::join!(self.search_rules(&question, k), self.search_schema(&question, k, None));

        let rule_context = join_content(&rule_docs);
        let schema_context = join_content(&schema_docs);
        let context = format!("[Rules]\n{}\n\n[DB Schema]\n{}", rule_context, schema_context);
        let sources = citations(&[rule_docs, schema_docs].concat());

        let sql = self
            .draft_sql(&question, &rule_context, &schema_context, &state.session_id)
            .await?;
        let design = self
            .generate(prompt::DESIGN_SYSTEM, &context, &question, &state.session_id)
            .await?;

        let answer = format!("[SQL Draft]\n{}\n\n[Design]\n{}", sql, design);
        Ok(HandlerOutput::new(answer, context, sources))
    }

    async fn code_analysis(&self, state: &OrchestrationState) -> EngineResult<HandlerOutput> {
        let question = state.effective_question();
        let answer = self
            .generate(prompt::CODE_SYSTEM, &state.file_context, &question, &state.session_id)
            .await?;
        Ok(HandlerOutput::new(
            answer,
            state.file_context.clone(),
            vec!["User Code Block".to_string()],
        ))
    }

    async fn db_schema(&self, state: &OrchestrationState) -> EngineResult<HandlerOutput> {
        let question = state.effective_question();

        if is_sql_request(&question) {
            let tables_only = MetadataFilter::new().any_of(META_TYPE, ["TABLE", "VIEW"]);
            let docs = self
                .search_schema(&question, self.settings.top_k, Some(&tables_only))
                .await;
            info!("🔎 SQL request: {} table document(s)", docs.len());

            let schema_context = join_content(&docs);
            let answer = self
                .draft_sql(&question, "", &schema_context, &state.session_id)
                .await?;
            return Ok(HandlerOutput::new(
                answer,
                format!("[DB Schema]\n{}", schema_context),
                citations(&docs),
            ));
        }

        let docs = self
            .search_schema(&question, self.settings.schema_browse_top_k, None)
            .await;
        let context = join_content(&docs);
        let answer = self
            .generate(prompt::SCHEMA_SYSTEM, &context, &question, &state.session_id)
            .await?;
        Ok(HandlerOutput::new(answer, context, citations(&docs)))
    }

    async fn rule_doc(&self, state: &OrchestrationState) -> EngineResult<HandlerOutput> {
        let question = state.effective_question();
        let docs = self
            .search_rules(&question, self.settings.rule_doc_top_k)
            .await;
        let context = join_content(&docs);
        let answer = self
            .generate(prompt::RULE_SYSTEM, &context, &question, &state.session_id)
            .await?;
        Ok(HandlerOutput::new(answer, context, citations(&docs)))
    }

    async fn general(&self, state: &OrchestrationState) -> EngineResult<HandlerOutput> {
        let answer = self
            .generate(prompt::GENERAL_SYSTEM, "", &state.question, &state.session_id)
            .await?;
        Ok(HandlerOutput::new(answer, "General Chat".to_string(), Vec::new()))
    }
}
