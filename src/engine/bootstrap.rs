//! Engine bootstrap: model client, catalog and both indices from config
//!
//! An index that cannot be loaded or built is replaced by an
//! [`UnavailableIndex`]; the engine still starts and handlers see empty
//! retrieval results.

use std::fs;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use super::{Collaborators, Engine, EngineSettings};
use crate::config::{Config, IndexConfig};
use crate::llm::OllamaClient;
use crate::memory::{ConversationStore, StoreConfig};
use crate::retrieval::chunker::{ChunkConfig, TextChunker};
use crate::retrieval::corpus::load_rule_documents;
use crate::retrieval::embedder;
use crate::retrieval::index::UnavailableIndex;
use crate::retrieval::{DocumentIndex, JsonCatalog, VectorIndex};

/// Load result of one index, for reporting
#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub name: &'static str,
    pub chunks: Option<usize>,
    pub error: Option<String>,
}

pub struct LoadedIndices {
    pub rules: Arc<dyn VectorIndex>,
    pub schema: Arc<dyn VectorIndex>,
    pub catalog: Arc<JsonCatalog>,
    pub status: Vec<IndexStatus>,
}

/// Schema catalog from `index.schema_catalog`, or an empty one
pub fn load_catalog(config: &IndexConfig) -> JsonCatalog {
    match &config.schema_catalog {
        Some(path) => JsonCatalog::load(path).unwrap_or_else(|e| {
            warn!("⚠️ Schema catalog unavailable: {:#}", e);
            JsonCatalog::default()
        }),
        None => {
            warn!("No schema catalog configured (index.schema_catalog)");
            JsonCatalog::default()
        }
    }
}

fn into_port(name: &'static str, result: Result<DocumentIndex>) -> (Arc<dyn VectorIndex>, IndexStatus) {
    match result {
        Ok(index) => {
            let status = IndexStatus {
                name,
                chunks: Some(index.len()),
                error: None,
            };
            (Arc::new(index), status)
        }
        Err(e) => {
            let status = IndexStatus {
                name,
                chunks: None,
                error: Some(format!("{:#}", e)),
            };
            (Arc::new(UnavailableIndex::new(name, &e)), status)
        }
    }
}

/// Load or build the rule and schema indices. Blocking; embeds over HTTP
/// when an index has to be built.
pub fn open_indices(config: &Config, rebuild: bool) -> Result<LoadedIndices> {
    let embedder = embedder::from_config(&config.embedding)?;
    let catalog = load_catalog(&config.index);
    let paths = &config.index;

    if rebuild {
        for path in [&paths.rule_index_path, &paths.schema_index_path] {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }

    let rule_chunker = TextChunker::new(ChunkConfig::new(
        paths.rule_chunk_size,
        paths.rule_chunk_overlap,
    ));
    let rules = DocumentIndex::load_or_build(
        "rule",
        &paths.rule_index_path,
        Arc::clone(&embedder),
        &rule_chunker,
        || match &paths.rules_source {
            Some(root) => load_rule_documents(root),
            None => bail!("no rule corpus configured (index.rules_source)"),
        },
    );

    let schema_chunker = TextChunker::new(ChunkConfig::new(
        paths.schema_chunk_size,
        paths.schema_chunk_overlap,
    ));
    let schema = DocumentIndex::load_or_build(
        "schema",
        &paths.schema_index_path,
        embedder,
        &schema_chunker,
        || Ok(catalog.source_documents()),
    );

    let (rules, rule_status) = into_port("rule", rules);
    let (schema, schema_status) = into_port("schema", schema);

    Ok(LoadedIndices {
        rules,
        schema,
        catalog: Arc::new(catalog),
        status: vec![rule_status, schema_status],
    })
}

impl Engine {
    /// Build the engine from configuration. Indices are loaded on a
    /// blocking thread.
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let llm = OllamaClient::from_config(&config.model)?;
        let owned = config.clone();
        let indices = tokio::task::spawn_blocking(move || open_indices(&owned, false))
            .await
            .context("Index loading task failed")??;

        let memory = Arc::new(ConversationStore::new(StoreConfig::from_config(&config.memory)?));
        let settings = EngineSettings::from_engine_config(&config.engine)?;

        info!(
            "💡 Engine ready: model {} / max retries {} / timeout {:?}",
            config.model.model, settings.max_retries, settings.collaborator_timeout
        );

        Engine::new(
            Collaborators {
                llm: Arc::new(llm),
                rules: indices.rules,
                schema: indices.schema,
                catalog: indices.catalog,
            },
            memory,
            settings,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingBackend;
    use std::io::Write;
    use tempfile::TempDir;

    const CATALOG: &str = r#"[
        { "name": "ORDERS", "kind": "TABLE", "columns": [{ "name": "FEE_AMT", "data_type": "NUMBER" }] },
        { "name": "CALC_FEE", "kind": "PROCEDURE", "source": "BEGIN NULL; END;" }
    ]"#;

    fn offline_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.embedding.backend = EmbeddingBackend::Blake3;
        config.embedding.dimension = 32;
        config.index.rule_index_path = dir.path().join("rules.index");
        config.index.schema_index_path = dir.path().join("schema.index");
        config
    }

    #[test]
    fn test_missing_sources_degrade() {
        let dir = TempDir::new().unwrap();
        let loaded = open_indices(&offline_config(&dir), false).unwrap();

        assert_eq!(loaded.status.len(), 2);
        assert!(loaded.status.iter().all(|s| s.chunks.is_none() && s.error.is_some()));
        assert!(loaded.catalog.objects().is_empty());
    }

    #[test]
    fn test_builds_and_persists() {
        let dir = TempDir::new().unwrap();
        let rules_dir = dir.path().join("rules");
        fs::create_dir_all(&rules_dir).unwrap();
        fs::write(rules_dir.join("fees.txt"), "Fees are charged monthly.").unwrap();

        let catalog_path = dir.path().join("catalog.json");
        fs::File::create(&catalog_path)
            .unwrap()
            .write_all(CATALOG.as_bytes())
            .unwrap();

        let mut config = offline_config(&dir);
        config.index.rules_source = Some(rules_dir);
        config.index.schema_catalog = Some(catalog_path);

        let loaded = open_indices(&config, false).unwrap();
        assert_eq!(loaded.status[0].chunks, Some(1));
        assert_eq!(loaded.status[1].chunks, Some(2));
        assert!(config.index.rule_index_path.exists());
        assert!(config.index.schema_index_path.exists());

        // second open loads from disk even without a corpus
        config.index.rules_source = None;
        let reloaded = open_indices(&config, false).unwrap();
        assert_eq!(reloaded.status[0].chunks, Some(1));

        let rebuilt = open_indices(&config, true).unwrap();
        assert!(rebuilt.status[0].error.is_some());
    }
}
