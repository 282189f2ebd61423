//! Document Index - persisted in-memory similarity index
//!
//! - Built once from source documents (chunk, embed, store)
//! - Saved with bincode through a temp file + rename
//! - Loaded on startup when the file exists
//! - Searched on the blocking pool with rayon-parallel cosine scoring

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::chunker::TextChunker;
use super::embedder::{cosine_similarity, Embedder};
use super::{DocumentOrigin, MetadataFilter, RetrievedDocument, VectorIndex};
use crate::error::{EngineError, EngineResult};

const FORMAT_VERSION: u32 = 1;

/// Unchunked input document
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub content: String,
    pub metadata: HashMap<String, String>,
}

impl SourceDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub content: String,
    pub metadata: HashMap<String, String>,
    pub embedding: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    backend: String,
    dimension: usize,
    built_at: chrono::DateTime<chrono::Utc>,
    chunks: Vec<IndexedChunk>,
}

pub struct DocumentIndex {
    name: String,
    chunks: Arc<Vec<IndexedChunk>>,
    embedder: Arc<dyn Embedder>,
}

impl DocumentIndex {
    /// Chunk and embed every document
    pub fn build(
        name: &str,
        documents: Vec<SourceDocument>,
        chunker: &TextChunker,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let pieces: Vec<(String, HashMap<String, String>)> = documents
            .into_iter()
            .flat_map(|doc| {
                let metadata = doc.metadata;
                chunker
                    .split(&doc.content)
                    .into_iter()
                    .map(move |chunk| (chunk, metadata.clone()))
            })
            .collect();

        let texts: Vec<&str> = pieces.iter().map(|(text, _)| text.as_str()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .with_context(|| format!("Failed to embed {} index", name))?;

        let chunks: Vec<IndexedChunk> = pieces
            .into_iter()
            .zip(embeddings)
            .map(|((content, metadata), embedding)| IndexedChunk {
                content,
                metadata,
                embedding,
            })
            .collect();

        info!("📚 Built {} index: {} chunks", name, chunks.len());

        Ok(Self {
            name: name.to_string(),
            chunks: Arc::new(chunks),
            embedder,
        })
    }

    /// Save to disk (atomic: temp file, then rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let persisted = PersistedIndex {
            version: FORMAT_VERSION,
            backend: self.embedder.backend().to_string(),
            dimension: self.embedder.dimension(),
            built_at: chrono::Utc::now(),
            chunks: self.chunks.as_ref().clone(),
        };

        let temp_path = path.with_extension("tmp");
        {
            let file = File::create(&temp_path)
                .with_context(|| format!("Failed to create {}", temp_path.display()))?;
            let writer = BufWriter::new(file);
            bincode::serialize_into(writer, &persisted)
                .context("Failed to serialize index (bincode)")?;
        }
        fs::rename(&temp_path, path)?;

        debug!("Saved {} index to {}", self.name, path.display());
        Ok(())
    }

    /// Load from disk. The file must have been built with the same embedder.
    pub fn load(name: &str, path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let reader = BufReader::new(file);
        let persisted: PersistedIndex =
            bincode::deserialize_from(reader).context("Failed to deserialize index")?;

        if persisted.version != FORMAT_VERSION {
            bail!(
                "{} index format v{} is not supported (expected v{})",
                name,
                persisted.version,
                FORMAT_VERSION
            );
        }
        if persisted.backend != embedder.backend() || persisted.dimension != embedder.dimension() {
            bail!(
                "{} index was built with {} ({}d), current embedder is {} ({}d); rebuild it",
                name,
                persisted.backend,
                persisted.dimension,
                embedder.backend(),
                embedder.dimension()
            );
        }

        info!(
            "✅ Loaded {} index: {} chunks (built {})",
            name,
            persisted.chunks.len(),
            persisted.built_at.format("%Y-%m-%d %H:%M")
        );

        Ok(Self {
            name: name.to_string(),
            chunks: Arc::new(persisted.chunks),
            embedder,
        })
    }

    /// Load the persisted index, or build it from `source` and save it
    pub fn load_or_build<F>(
        name: &str,
        path: &Path,
        embedder: Arc<dyn Embedder>,
        chunker: &TextChunker,
        source: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Result<Vec<SourceDocument>>,
    {
        if path.exists() {
            return Self::load(name, path, embedder);
        }

        let documents = source()?;
        if documents.is_empty() {
            bail!("no source documents for {} index", name);
        }

        let index = Self::build(name, documents, chunker, embedder)?;
        index.save(path)?;
        Ok(index)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn search_blocking(
        chunks: &[IndexedChunk],
        embedder: &dyn Embedder,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedDocument>> {
        let query_vec = embedder.embed(query)?;

        let mut scored: Vec<(usize, f32)> = chunks
            .par_iter()
            .enumerate()
            .filter(|(_, chunk)| filter.map(|f| f.matches(&chunk.metadata)).unwrap_or(true))
            .map(|(i, chunk)| (i, cosine_similarity(&query_vec, &chunk.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, _)| RetrievedDocument {
                content: chunks[i].content.clone(),
                origin: DocumentOrigin::from_metadata(&chunks[i].metadata),
            })
            .collect())
    }
}

#[async_trait]
impl VectorIndex for DocumentIndex {
    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> EngineResult<Vec<RetrievedDocument>> {
        let chunks = Arc::clone(&self.chunks);
        let embedder = Arc::clone(&self.embedder);
        let query = query.to_string();
        let filter = filter.cloned();

        let docs = tokio::task::spawn_blocking(move || {
            Self::search_blocking(&chunks, embedder.as_ref(), &query, k, filter.as_ref())
        })
        .await
        .map_err(EngineError::retrieval)?
        .map_err(|e| EngineError::retrieval(format!("{} search failed: {:#}", self.name, e)))?;

        debug!("{} search -> {} document(s)", self.name, docs.len());
        Ok(docs)
    }
}

/// Stand-in for an index that failed to load or build
pub struct UnavailableIndex {
    reason: String,
}

impl UnavailableIndex {
    pub fn new(name: &str, err: &anyhow::Error) -> Self {
        warn!("⚠️ {} index unavailable: {:#}", name, err);
        Self {
            reason: format!("{} index: {:#}", name, err),
        }
    }
}

#[async_trait]
impl VectorIndex for UnavailableIndex {
    async fn search(
        &self,
        _query: &str,
        _k: usize,
        _filter: Option<&MetadataFilter>,
    ) -> EngineResult<Vec<RetrievedDocument>> {
        Err(EngineError::RetrievalUnavailable(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::chunker::ChunkConfig;
    use crate::retrieval::embedder::Blake3Embedder;
    use crate::retrieval::{META_NAME, META_TYPE};
    use tempfile::tempdir;

    fn schema_docs() -> Vec<SourceDocument> {
        vec![
            SourceDocument::new("Object: ORDERS (Type: TABLE)")
                .with_metadata(META_NAME, "ORDERS")
                .with_metadata(META_TYPE, "TABLE"),
            SourceDocument::new("Object: ORDER_SUMMARY (Type: VIEW)")
                .with_metadata(META_NAME, "ORDER_SUMMARY")
                .with_metadata(META_TYPE, "VIEW"),
            SourceDocument::new("Object: CALC_FEE\nType: PROCEDURE")
                .with_metadata(META_NAME, "CALC_FEE")
                .with_metadata(META_TYPE, "PROCEDURE"),
        ]
    }

    fn build() -> DocumentIndex {
        DocumentIndex::build(
            "schema",
            schema_docs(),
            &TextChunker::new(ChunkConfig::new(2000, 200)),
            Arc::new(Blake3Embedder::new(32)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_exact_text_ranks_first() {
        let index = build();
        assert_eq!(index.len(), 3);

        let docs = index.search("Object: ORDERS (Type: TABLE)", 1, None).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(
            docs[0].origin,
            DocumentOrigin::SchemaObject {
                name: "ORDERS".into(),
                kind: "TABLE".into()
            }
        );
    }

    #[tokio::test]
    async fn test_filter_applies_before_top_k() {
        let index = build();
        let filter = MetadataFilter::new().any_of(META_TYPE, ["TABLE", "VIEW"]);
        let docs = index
            .search("Object: CALC_FEE\nType: PROCEDURE", 5, Some(&filter))
            .await
            .unwrap();

        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| !d.content.contains("PROCEDURE")));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema.index");
        build().save(&path).unwrap();

        let loaded = DocumentIndex::load("schema", &path, Arc::new(Blake3Embedder::new(32))).unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(!path.with_extension("tmp").exists());

        // dimension mismatch forces a rebuild
        assert!(DocumentIndex::load("schema", &path, Arc::new(Blake3Embedder::new(64))).is_err());
    }

    #[test]
    fn test_load_or_build_builds_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rules.index");
        let chunker = TextChunker::new(ChunkConfig::default());
        let embedder: Arc<dyn Embedder> = Arc::new(Blake3Embedder::new(16));

        let built = DocumentIndex::load_or_build("rules", &path, Arc::clone(&embedder), &chunker, || {
            Ok(schema_docs())
        })
        .unwrap();
        assert_eq!(built.len(), 3);
        assert!(path.exists());

        let loaded = DocumentIndex::load_or_build("rules", &path, embedder, &chunker, || {
            panic!("source must not be read when the index exists")
        })
        .unwrap();
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn test_empty_source_is_error() {
        let dir = tempdir().unwrap();
        let result = DocumentIndex::load_or_build(
            "rules",
            &dir.path().join("rules.index"),
            Arc::new(Blake3Embedder::new(16)),
            &TextChunker::new(ChunkConfig::default()),
            || Ok(Vec::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unavailable_index() {
        let index = UnavailableIndex::new("rules", &anyhow::anyhow!("missing corpus"));
        let result = index.search("q", 5, None).await;
        assert!(matches!(result, Err(EngineError::RetrievalUnavailable(_))));
    }
}
