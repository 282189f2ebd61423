//! Retrieval Ports - Similarity indices and the schema catalog
//!
//! - [`VectorIndex`]: top-k similarity search with an optional metadata filter
//! - [`SchemaSource`]: structured schema listing and keyword search
//! - [`DocumentIndex`]: persisted in-memory implementation of `VectorIndex`
//! - [`citations`]: groups retrieved documents into sorted source strings

pub mod chunker;
pub mod corpus;
pub mod embedder;
pub mod index;
pub mod schema;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;

use crate::error::EngineResult;

pub use embedder::{Blake3Embedder, Embedder, HttpEmbedder};
pub use index::DocumentIndex;
pub use schema::{JsonCatalog, SchemaObject};

/// Metadata key carrying the file name of a rule chunk
pub const META_SOURCE: &str = "source";
/// Metadata key carrying the page number of a rule chunk
pub const META_PAGE: &str = "page";
/// Metadata key carrying a schema object name
pub const META_NAME: &str = "name";
/// Metadata key carrying a schema object kind (TABLE, VIEW, PROCEDURE)
pub const META_TYPE: &str = "type";

// ============================================================================
// Documents
// ============================================================================

/// Where a retrieved document came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOrigin {
    FilePage { source: String, page: Option<u32> },
    SchemaObject { name: String, kind: String },
    Unknown,
}

impl DocumentOrigin {
    /// Derive the origin from chunk metadata. A `source` key wins over `name`.
    pub fn from_metadata(metadata: &HashMap<String, String>) -> Self {
        if let Some(source) = metadata.get(META_SOURCE) {
            let page = metadata.get(META_PAGE).and_then(|p| p.trim().parse().ok());
            return DocumentOrigin::FilePage {
                source: source.clone(),
                page,
            };
        }
        if let Some(name) = metadata.get(META_NAME) {
            return DocumentOrigin::SchemaObject {
                name: name.clone(),
                kind: metadata.get(META_TYPE).cloned().unwrap_or_default(),
            };
        }
        DocumentOrigin::Unknown
    }
}

#[derive(Debug, Clone)]
pub struct RetrievedDocument {
    pub content: String,
    pub origin: DocumentOrigin,
}

impl RetrievedDocument {
    pub fn file_page(content: impl Into<String>, source: impl Into<String>, page: u32) -> Self {
        Self {
            content: content.into(),
            origin: DocumentOrigin::FilePage {
                source: source.into(),
                page: Some(page),
            },
        }
    }

    pub fn schema_object(
        content: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            origin: DocumentOrigin::SchemaObject {
                name: name.into(),
                kind: kind.into(),
            },
        }
    }
}

/// Join document bodies into one context block
pub fn join_content(docs: &[RetrievedDocument]) -> String {
    docs.iter()
        .map(|d| d.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Metadata Filter
// ============================================================================

/// Conjunction of `key ∈ {values}` clauses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    clauses: BTreeMap<String, BTreeSet<String>>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn any_of<I, S>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.clauses
            .entry(key.to_string())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn matches(&self, metadata: &HashMap<String, String>) -> bool {
        self.clauses.iter().all(|(key, allowed)| {
            metadata
                .get(key)
                .map(|value| allowed.contains(value))
                .unwrap_or(false)
        })
    }
}

// ============================================================================
// Ports
// ============================================================================

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Top-k documents for the query, best first
    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> EngineResult<Vec<RetrievedDocument>>;
}

#[async_trait]
pub trait SchemaSource: Send + Sync {
    async fn list_all_objects(&self) -> EngineResult<Vec<SchemaObject>>;

    /// Keyword search over names, columns, comments and code; returns a
    /// rendered text block
    async fn search_by_keyword(&self, term: &str) -> EngineResult<String>;
}

// ============================================================================
// Citations
// ============================================================================

/// Group documents into citation strings.
///
/// File pages merge per source into `name (p.1, 3)`; schema objects merge
/// into a single `DB Tables: A, B` entry. The result is sorted.
pub fn citations(docs: &[RetrievedDocument]) -> Vec<String> {
    let mut files: BTreeMap<&str, BTreeSet<u32>> = BTreeMap::new();
    let mut tables: BTreeSet<&str> = BTreeSet::new();
    let mut unknown = false;

    for doc in docs {
        match &doc.origin {
            DocumentOrigin::FilePage { source, page } => {
                let pages = files.entry(source.as_str()).or_default();
                if let Some(page) = page {
                    pages.insert(*page);
                }
            }
            DocumentOrigin::SchemaObject { name, .. } => {
                tables.insert(name.as_str());
            }
            DocumentOrigin::Unknown => unknown = true,
        }
    }

    let mut results: Vec<String> = files
        .into_iter()
        .map(|(source, pages)| {
            if pages.is_empty() {
                source.to_string()
            } else {
                let pages: Vec<String> = pages.iter().map(u32::to_string).collect();
                format!("{} (p.{})", source, pages.join(", "))
            }
        })
        .collect();

    if unknown {
        results.push("Unknown Source".to_string());
    }

    if !tables.is_empty() {
        let names: Vec<&str> = tables.into_iter().collect();
        results.push(format!("DB Tables: {}", names.join(", ")));
    }

    results.sort();
    results
}
