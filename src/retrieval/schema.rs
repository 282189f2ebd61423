//! Schema Catalog - relational schema from a JSON export
//!
//! Accepts either a bare array of objects or `{ "objects": [...] }`:
//!
//! ```json
//! [{ "name": "ORDERS", "kind": "TABLE", "comment": "Orders",
//!    "columns": [{ "name": "ID", "data_type": "NUMBER", "comment": "PK" }] },
//!  { "name": "CALC_FEE", "kind": "PROCEDURE", "source": "BEGIN ... END;" }]
//! ```
//!
//! Recycle-bin objects (`BIN$...`) are dropped on load.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::index::SourceDocument;
use super::{SchemaSource, META_NAME, META_TYPE};
use crate::error::EngineResult;

pub const KEYWORD_TOO_SHORT: &str = "Keyword is too short (at least 2 characters).";
pub const NO_KEYWORD_RESULTS: &str = "No matching schema objects.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchemaObject {
    pub name: String,
    /// TABLE, VIEW, PROCEDURE, FUNCTION, PACKAGE, ...
    pub kind: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Source text for stored code
    #[serde(default)]
    pub source: Option<String>,
}

impl SchemaObject {
    pub fn is_table_like(&self) -> bool {
        matches!(self.kind.to_uppercase().as_str(), "TABLE" | "VIEW")
    }

    /// Type tag stored in index metadata: TABLE, VIEW or PROCEDURE
    pub fn index_type(&self) -> &'static str {
        match self.kind.to_uppercase().as_str() {
            "TABLE" => "TABLE",
            "VIEW" => "VIEW",
            _ => "PROCEDURE",
        }
    }

    /// Text form embedded into the schema index
    pub fn render(&self) -> String {
        if self.is_table_like() {
            let comment = self
                .comment
                .as_deref()
                .filter(|c| !c.is_empty())
                .map(|c| format!(" ({})", c))
                .unwrap_or_default();
            let columns: Vec<String> = self
                .columns
                .iter()
                .map(|col| {
                    let comment = col
                        .comment
                        .as_deref()
                        .filter(|c| !c.is_empty())
                        .map(|c| format!(" -- {}", c))
                        .unwrap_or_default();
                    format!("  - {} ({}){}", col.name, col.data_type, comment)
                })
                .collect();
            format!(
                "Object: {} (Type: {}){}\nColumns:\n{}",
                self.name,
                self.kind.to_uppercase(),
                comment,
                columns.join("\n")
            )
        } else {
            format!(
                "Object: {}\nType: {}\nSource Code:\n```sql\n{}\n```",
                self.name,
                self.kind.to_uppercase(),
                self.source.as_deref().unwrap_or("").trim_end()
            )
        }
    }

    pub fn to_source_document(&self) -> SourceDocument {
        SourceDocument::new(self.render())
            .with_metadata(META_NAME, self.name.as_str())
            .with_metadata(META_TYPE, self.index_type())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<SchemaObject>),
    Wrapped { objects: Vec<SchemaObject> },
}

/// In-memory schema catalog loaded from JSON
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    objects: Vec<SchemaObject>,
}

impl JsonCatalog {
    pub fn from_objects(objects: Vec<SchemaObject>) -> Self {
        let objects = objects
            .into_iter()
            .filter(|o| !o.name.starts_with("BIN$"))
            .collect();
        Self { objects }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json).context("Invalid schema catalog JSON")?;
        let objects = match file {
            CatalogFile::List(objects) => objects,
            CatalogFile::Wrapped { objects } => objects,
        };
        Ok(Self::from_objects(objects))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema catalog: {}", path.display()))?;
        let catalog = Self::from_json(&content)
            .with_context(|| format!("Failed to parse schema catalog: {}", path.display()))?;
        info!("🗄️ Loaded schema catalog: {} object(s)", catalog.objects.len());
        Ok(catalog)
    }

    pub fn objects(&self) -> &[SchemaObject] {
        &self.objects
    }

    pub fn source_documents(&self) -> Vec<SourceDocument> {
        self.objects.iter().map(SchemaObject::to_source_document).collect()
    }

    /// Case-insensitive keyword lookup over names, columns, comments and code
    pub fn keyword_search(&self, term: &str) -> String {
        let term = term.trim();
        if term.chars().count() < 2 {
            return KEYWORD_TOO_SHORT.to_string();
        }
        let needle = term.to_lowercase();
        let hit = |s: &str| s.to_lowercase().contains(&needle);

        let tables: Vec<String> = self
            .objects
            .iter()
            .filter(|o| o.is_table_like())
            .filter(|o| {
                hit(&o.name)
                    || o.columns.iter().any(|c| {
                        hit(&c.name) || c.comment.as_deref().map(hit).unwrap_or(false)
                    })
            })
            .map(|o| format!("- {} ({})", o.name, o.comment.as_deref().unwrap_or("")))
            .collect();

        let code: Vec<String> = self
            .objects
            .iter()
            .filter(|o| !o.is_table_like())
            .filter(|o| hit(&o.name) || o.source.as_deref().map(hit).unwrap_or(false))
            .map(|o| format!("- [{}] {}", o.kind.to_uppercase(), o.name))
            .collect();

        let mut out = Vec::new();
        if !tables.is_empty() {
            out.push(format!("=== [Tables] '{}' ===", term));
            out.extend(tables);
            out.push(String::new());
        }
        if !code.is_empty() {
            out.push(format!("=== [Code] '{}' ===", term));
            out.extend(code);
        }

        if out.is_empty() {
            NO_KEYWORD_RESULTS.to_string()
        } else {
            out.join("\n")
        }
    }
}

#[async_trait]
impl SchemaSource for JsonCatalog {
    async fn list_all_objects(&self) -> EngineResult<Vec<SchemaObject>> {
        Ok(self.objects.clone())
    }

    async fn search_by_keyword(&self, term: &str) -> EngineResult<String> {
        Ok(self.keyword_search(term))
    }
}
