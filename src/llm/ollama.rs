//! Ollama chat client (`POST /api/chat`, non-streaming)

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{ChatMessage, LanguageModel};
use crate::config::ModelConfig;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    endpoint: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
            model: model.to_string(),
            temperature: 0.1,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn from_config(config: &ModelConfig) -> anyhow::Result<Self> {
        Ok(Self::new(&config.base_url, &config.model)
            .with_temperature(config.temperature)
            .with_timeout(config.request_timeout()?))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, messages: &[ChatMessage]) -> EngineResult<String> {
        let payload = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": self.temperature }
        });

        let response = ureq::post(&self.endpoint)
            .timeout(self.timeout)
            .set("Content-Type", "application/json")
            .send_json(&payload)
            .map_err(EngineError::generation)?;

        let json: serde_json::Value = response.into_json().map_err(EngineError::generation)?;

        json["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EngineError::GenerationFailure("no message content in response".into()))
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn chat(&self, messages: &[ChatMessage]) -> EngineResult<String> {
        debug!("chat -> {} ({} messages)", self.model, messages.len());

        // ureq is blocking
        let client = self.clone();
        let messages = messages.to_vec();

        tokio::task::spawn_blocking(move || client.request(&messages))
            .await
            .map_err(EngineError::generation)?
    }

    fn name(&self) -> &str {
        &self.model
    }
}
