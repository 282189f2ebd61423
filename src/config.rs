//! Configuration Module - Engine settings from ~/.config/ragrouter/config.toml
//!
//! Supports:
//! - Model and embedding endpoints
//! - Persisted index locations and corpus paths
//! - Conversation memory bounds and eviction timing
//! - Retry bound, collaborator deadline and per-handler context budgets

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Ragrouter Configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Language model endpoint
    pub model: ModelConfig,
    /// Embedding backend
    pub embedding: EmbeddingConfig,
    /// Index persistence and corpus locations
    pub index: IndexConfig,
    /// Conversation memory
    pub memory: MemoryConfig,
    /// Orchestration engine
    pub engine: EngineConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Language model settings (Ollama chat API)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the Ollama server
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// HTTP request timeout, e.g. "120s"
    pub request_timeout: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            temperature: 0.1,
            request_timeout: "120s".to_string(),
        }
    }
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Ollama embeddings endpoint
    #[default]
    Ollama,
    /// Deterministic blake3 pseudo-embeddings (offline / testing)
    Blake3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    /// Embeddings endpoint (Ollama: /api/embeddings)
    pub endpoint: String,
    /// Embedding model
    pub model: String,
    /// Vector dimension
    pub dimension: usize,
    /// HTTP request timeout, e.g. "30s"
    pub request_timeout: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            endpoint: "http://localhost:11434/api/embeddings".to_string(),
            model: "nomic-embed-text".to_string(),
            dimension: 768,
            request_timeout: "30s".to_string(),
        }
    }
}

/// Index persistence and corpus locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Persisted schema index
    pub schema_index_path: PathBuf,
    /// Persisted rule/document index
    pub rule_index_path: PathBuf,
    /// Rule corpus: a PDF/text file or a directory of them
    pub rules_source: Option<PathBuf>,
    /// JSON schema catalog export
    pub schema_catalog: Option<PathBuf>,
    /// Rule chunk size in characters
    pub rule_chunk_size: usize,
    pub rule_chunk_overlap: usize,
    /// Schema chunk size in characters
    pub schema_chunk_size: usize,
    pub schema_chunk_overlap: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        let data_dir = Config::data_dir();
        Self {
            schema_index_path: data_dir.join("schema.index"),
            rule_index_path: data_dir.join("rules.index"),
            rules_source: None,
            schema_catalog: None,
            rule_chunk_size: 1000,
            rule_chunk_overlap: 200,
            schema_chunk_size: 2000,
            schema_chunk_overlap: 200,
        }
    }
}

/// Conversation memory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Messages kept per session (0 = memory disabled)
    pub max_history: usize,
    /// Sessions idle longer than this are evicted, e.g. "60m"
    pub idle_timeout: String,
    /// Period of the eviction sweep, e.g. "10m"
    pub sweep_interval: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history: 20,
            idle_timeout: "60m".to_string(),
            sweep_interval: "10m".to_string(),
        }
    }
}

/// Orchestration engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Validator-driven retries (clamped to 1..=2)
    pub max_retries: u32,
    /// Deadline for every collaborator call, e.g. "90s"
    pub collaborator_timeout: String,
    /// Character budget for the file_only context
    pub file_only_budget: usize,
    /// Character budget for the uploaded file in version_compare
    pub version_compare_budget: usize,
    /// Character budget for the uploaded file in cross_check
    pub cross_check_file_budget: usize,
    /// Answers shorter than this skip validation
    pub min_answer_len: usize,
    /// Default top-k for rule/schema lookups
    pub top_k: usize,
    /// Top-k for rule_doc (wide coverage)
    pub rule_doc_top_k: usize,
    /// Top-k for unfiltered schema browsing
    pub schema_browse_top_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            collaborator_timeout: "90s".to_string(),
            file_only_budget: 10_000,
            version_compare_budget: 5_000,
            cross_check_file_budget: 2_000,
            min_answer_len: 10,
            top_k: 5,
            rule_doc_top_k: 10,
            schema_browse_top_k: 8,
        }
    }
}

impl EngineConfig {
    pub fn max_retries(&self) -> u32 {
        self.max_retries.clamp(1, 2)
    }

    pub fn collaborator_timeout(&self) -> Result<Duration> {
        parse_duration_field("engine.collaborator_timeout", &self.collaborator_timeout)
    }
}

impl MemoryConfig {
    pub fn idle_timeout(&self) -> Result<Duration> {
        parse_duration_field("memory.idle_timeout", &self.idle_timeout)
    }

    pub fn sweep_interval(&self) -> Result<Duration> {
        parse_duration_field("memory.sweep_interval", &self.sweep_interval)
    }
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration_field("model.request_timeout", &self.request_timeout)
    }
}

impl EmbeddingConfig {
    pub fn request_timeout(&self) -> Result<Duration> {
        parse_duration_field("embedding.request_timeout", &self.request_timeout)
    }
}

fn parse_duration_field(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .with_context(|| format!("Invalid duration for {}: {:?}", field, value))
}

fn ensure_positive(field: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        anyhow::bail!("{} must be greater than zero", field);
    }
    Ok(())
}

impl Config {
    /// Load config from default path or return defaults
    pub fn load() -> Self {
        Self::load_from(&Self::default_path()).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        Ok(config)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "tunclon", "ragrouter")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".ragrouter")
                    .join("config.toml")
            })
    }

    /// Directory for persisted indices
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("com", "tunclon", "ragrouter")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".ragrouter")
                    .join("data")
            })
    }

    /// Create default config file if it doesn't exist
    pub fn ensure_exists() -> Result<PathBuf> {
        let path = Self::default_path();
        if !path.exists() {
            let config = Config::default();
            config.save_to(&path)?;
            tracing::info!("Created default config at {}", path.display());
        }
        Ok(path)
    }

    /// Check every duration field parses and is non-zero
    pub fn validate(&self) -> Result<()> {
        self.general
            .log_level
            .trim()
            .parse::<tracing::Level>()
            .map_err(|_| anyhow::anyhow!("Invalid general.log_level: {:?}", self.general.log_level))?;
        ensure_positive("model.request_timeout", self.model.request_timeout()?)?;
        ensure_positive("embedding.request_timeout", self.embedding.request_timeout()?)?;
        ensure_positive("memory.idle_timeout", self.memory.idle_timeout()?)?;
        ensure_positive("memory.sweep_interval", self.memory.sweep_interval()?)?;
        ensure_positive("engine.collaborator_timeout", self.engine.collaborator_timeout()?)?;
        Ok(())
    }
}

/// Generate a sample config file with comments
pub fn generate_sample_config() -> String {
    r#"# Ragrouter Configuration
# Location: ~/.config/ragrouter/config.toml (or %APPDATA%\ragrouter\config.toml on Windows)

[general]
# Log level: trace, debug, info, warn, error
log_level = "info"

[model]
# Ollama server and chat model
base_url = "http://localhost:11434"
model = "llama3.1"
temperature = 0.1
request_timeout = "120s"

[embedding]
# "ollama" or "blake3" (offline pseudo-embeddings, no semantic ranking)
backend = "ollama"
endpoint = "http://localhost:11434/api/embeddings"
model = "nomic-embed-text"
dimension = 768
request_timeout = "30s"

[index]
# Persisted indices are loaded on startup, or built once and saved
# schema_index_path = "/var/lib/ragrouter/schema.index"
# rule_index_path = "/var/lib/ragrouter/rules.index"

# Rule corpus: a PDF/text file or a directory of them
# rules_source = "/srv/rules/market-rules.pdf"

# JSON export of the relational schema (tables, columns, comments, procedures)
# schema_catalog = "/srv/rules/schema.json"

rule_chunk_size = 1000
rule_chunk_overlap = 200
schema_chunk_size = 2000
schema_chunk_overlap = 200

[memory]
# Messages kept per session (0 disables conversation memory)
max_history = 20

# Idle sessions are evicted after this long
idle_timeout = "60m"

# How often the eviction sweep runs
sweep_interval = "10m"

[engine]
# Validator-driven retries (1 or 2)
max_retries = 2

# Deadline for every model / index / schema call
collaborator_timeout = "90s"

# Context budgets (characters)
file_only_budget = 10000
version_compare_budget = 5000
cross_check_file_budget = 2000

# Answers shorter than this are not validated
min_answer_len = 10

top_k = 5
rule_doc_top_k = 10
schema_browse_top_k = 8
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.memory.max_history, 20);
        assert_eq!(config.engine.max_retries(), 2);
        assert_eq!(config.engine.file_only_budget, 10_000);
        assert_eq!(config.general.log_level, "info");
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_config.toml");

        let mut config = Config::default();
        config.model.model = "qwen2.5".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.model.model, "qwen2.5");
        assert_eq!(loaded.index.rule_chunk_size, config.index.rule_chunk_size);
    }

    #[test]
    fn test_parse_sample_config() {
        let sample = generate_sample_config();
        let config: Config = toml::from_str(&sample).unwrap();
        config.validate().unwrap();
        assert_eq!(config.embedding.backend, EmbeddingBackend::Ollama);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[memory]\nmax_history = 4\n").unwrap();
        assert_eq!(config.memory.max_history, 4);
        assert_eq!(config.memory.idle_timeout, "60m");
        assert_eq!(config.engine.top_k, 5);
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(
            config.memory.idle_timeout().unwrap(),
            Duration::from_secs(3600)
        );
        assert_eq!(
            config.memory.sweep_interval().unwrap(),
            Duration::from_secs(600)
        );

        let mut bad = Config::default();
        bad.engine.collaborator_timeout = "soon".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_log_level_checked() {
        let mut config = Config::default();
        config.general.log_level = "WARN".to_string();
        config.validate().unwrap();

        config.general.log_level = "loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("general.log_level"), "{}", err);
    }

    #[test]
    fn test_zero_durations_rejected() {
        for field in ["sweep_interval", "idle_timeout", "collaborator_timeout"] {
            let mut config = Config::default();
            match field {
                "sweep_interval" => config.memory.sweep_interval = "0s".to_string(),
                "idle_timeout" => config.memory.idle_timeout = "0s".to_string(),
                _ => config.engine.collaborator_timeout = "0s".to_string(),
            }
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(field), "{}", err);
        }

        let mut config = Config::default();
        config.embedding.request_timeout = "0s".to_string();
        assert!(config.validate().is_err());
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_max_retries_clamped() {
        let mut engine = EngineConfig::default();
        engine.max_retries = 9;
        assert_eq!(engine.max_retries(), 2);
        engine.max_retries = 0;
        assert_eq!(engine.max_retries(), 1);
    }
}
