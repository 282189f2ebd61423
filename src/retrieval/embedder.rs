//! Embedders - text to vector
//!
//! - Ollama `/api/embeddings` over HTTP
//! - Blake3-based pseudo-embeddings for offline runs and tests

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::config::{EmbeddingBackend, EmbeddingConfig};

// ============================================================================
// Embedder Trait
// ============================================================================

/// Trait for embedding implementations
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Get backend name
    fn backend(&self) -> &str;
}

/// Build the embedder selected in config
pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.backend {
        EmbeddingBackend::Ollama => Arc::new(
            HttpEmbedder::new(&config.endpoint, &config.model, config.dimension)
                .with_timeout(config.request_timeout()?),
        ),
        EmbeddingBackend::Blake3 => Arc::new(Blake3Embedder::new(config.dimension)),
    };
    Ok(embedder)
}

// ============================================================================
// Blake3 Pseudo-Embedder
// ============================================================================

/// Deterministic pseudo-embeddings from a Blake3 hash.
/// Identical text maps to identical vectors; there is no semantic ranking.
pub struct Blake3Embedder {
    dimension: usize,
}

impl Blake3Embedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Embedder for Blake3Embedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // XOF output covers any dimension without repeating the 32-byte digest
        let mut reader = blake3::Hasher::new().update(text.as_bytes()).finalize_xof();
        let mut bytes = vec![0u8; self.dimension];
        reader.fill(&mut bytes);

        let mut vector: Vec<f32> = bytes
            .iter()
            .map(|b| (*b as f32 / 255.0) * 2.0 - 1.0)
            .collect();

        // Normalize
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.par_iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn backend(&self) -> &str {
        "blake3-pseudo"
    }
}

// ============================================================================
// HTTP Embedder (Ollama)
// ============================================================================

/// Embedder using the Ollama embeddings API
pub struct HttpEmbedder {
    endpoint: String,
    model: String,
    dimension: usize,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(endpoint: &str, model: &str, dimension: usize) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            dimension,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let payload = serde_json::json!({
            "model": self.model,
            "prompt": text
        });

        let response = ureq::post(&self.endpoint)
            .timeout(self.timeout)
            .set("Content-Type", "application/json")
            .send_json(&payload)
            .context("Failed to send embedding request")?;

        let json: serde_json::Value = response
            .into_json()
            .context("Failed to parse JSON response")?;

        let embedding: Vec<f32> = json["embedding"]
            .as_array()
            .context("No embedding in response")?
            .iter()
            .filter_map(|v: &serde_json::Value| v.as_f64().map(|f| f as f32))
            .collect();

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Ollama doesn't support batch, so process sequentially
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn backend(&self) -> &str {
        "http-ollama"
    }
}

// ============================================================================
// Similarity
// ============================================================================

/// Compute cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
