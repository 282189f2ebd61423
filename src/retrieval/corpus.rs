//! Rule corpus loading: PDFs page by page, text and markdown whole

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::index::SourceDocument;
use super::{META_PAGE, META_SOURCE};
use crate::intake::extract::pdf_pages;

const RULE_EXTENSIONS: &[&str] = &["pdf", "txt", "md", "markdown"];

/// Read every rule document under `root` (a single file or a directory)
pub fn load_rule_documents(root: &Path) -> Result<Vec<SourceDocument>> {
    if !root.exists() {
        anyhow::bail!("rule corpus not found: {}", root.display());
    }

    let mut documents = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if !RULE_EXTENSIONS.contains(&ext.as_str()) {
            debug!("Skipping non-rule file {}", path.display());
            continue;
        }

        match load_file(path, &ext) {
            Ok(mut docs) => documents.append(&mut docs),
            Err(e) => warn!("Failed to read rule file {}: {:#}", path.display(), e),
        }
    }

    info!("📄 Loaded {} rule page(s) from {}", documents.len(), root.display());
    Ok(documents)
}

fn load_file(path: &Path, ext: &str) -> Result<Vec<SourceDocument>> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    if ext == "pdf" {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let pages = pdf_pages(&name, &bytes)?;
        return Ok(pages
            .into_iter()
            .enumerate()
            .filter_map(|(i, text)| {
                let text = text.replace('\n', " ");
                let text = text.trim();
                (!text.is_empty()).then(|| {
                    SourceDocument::new(text)
                        .with_metadata(META_SOURCE, name.as_str())
                        .with_metadata(META_PAGE, (i + 1).to_string())
                })
            })
            .collect());
    }

    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![SourceDocument::new(text).with_metadata(META_SOURCE, name)])
}
