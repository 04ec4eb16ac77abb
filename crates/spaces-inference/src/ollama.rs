//! Ollama inference backend.
//!
//! Embedding uses `/api/embed` (batched, normalized); generation uses the
//! `/api/chat` endpoint so thinking models keep reasoning out of the answer.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use spaces_core::traits::normalize_in_place;
use spaces_core::{
    defaults, EmbeddingBackend, Error, GenerationBackend, ImageEmbeddingBackend, Result, Settings,
    Vector,
};

/// Ollama backend serving embeddings and generation.
#[derive(Debug)]
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    embed_model: String,
    gen_model: String,
    dimension: usize,
    embed_timeout: Duration,
    gen_timeout: Duration,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatRequestOptions,
}

#[derive(Serialize)]
struct ChatRequestOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OllamaBackend {
    /// Create with explicit configuration.
    pub fn with_config(
        base_url: String,
        embed_model: String,
        gen_model: String,
        dimension: usize,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(defaults::GEN_TIMEOUT_SECS))
            .build()
            .expect("HTTP client construction is infallible with static config");

        info!(
            subsystem = "inference",
            component = "ollama",
            base_url = %base_url,
            embed_model = %embed_model,
            gen_model = %gen_model,
            "Initializing Ollama backend"
        );

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            embed_model,
            gen_model,
            dimension,
            embed_timeout: Duration::from_secs(defaults::EMBED_TIMEOUT_SECS),
            gen_timeout: Duration::from_secs(defaults::GEN_TIMEOUT_SECS),
        }
    }

    /// Create from service settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_config(
            settings.ollama_host.clone(),
            settings.embedding_model.clone(),
            settings.ollama_model.clone(),
            settings.embedding_dim,
        )
    }

    /// Swap the generation model (per-request provider overrides).
    pub fn set_gen_model(&mut self, model: String) {
        self.gen_model = model;
    }

    async fn chat(&self, system: &str, prompt: &str, temperature: f32, max_tokens: u32) -> Result<String> {
        let start = Instant::now();
        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt.to_string(),
        });

        let request = ChatRequest {
            model: self.gen_model.clone(),
            messages,
            stream: false,
            options: ChatRequestOptions {
                temperature,
                num_predict: max_tokens as i32,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(self.gen_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!("ollama returned {status}: {body}")));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("ollama response parse: {e}")))?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            subsystem = "inference",
            component = "ollama",
            op = "generate",
            model = %self.gen_model,
            response_len = result.message.content.len(),
            duration_ms = elapsed,
            "Generation complete"
        );
        if elapsed > 30_000 {
            warn!(
                subsystem = "inference",
                component = "ollama",
                duration_ms = elapsed,
                "Slow generation"
            );
        }
        Ok(result.message.content)
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(defaults::EMBED_BATCH_SIZE) {
            let response = self
                .client
                .post(format!("{}/api/embed", self.base_url))
                .timeout(self.embed_timeout)
                .json(&EmbedRequest {
                    model: &self.embed_model,
                    input: batch,
                })
                .send()
                .await
                .map_err(|e| Error::Embedding(format!("ollama embed failed: {e}")))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Embedding(format!("ollama returned {status}: {body}")));
            }

            let parsed: EmbedResponse = response
                .json()
                .await
                .map_err(|e| Error::Embedding(format!("embed response parse: {e}")))?;

            for mut vec in parsed.embeddings {
                if vec.len() != self.dimension {
                    return Err(Error::Validation(format!(
                        "embedding dimension {} from model {} does not match configured {}",
                        vec.len(),
                        self.embed_model,
                        self.dimension
                    )));
                }
                normalize_in_place(&mut vec);
                out.push(vec);
            }
        }

        debug!(
            subsystem = "inference",
            component = "ollama",
            op = "embed_texts",
            model = %self.embed_model,
            input_count = texts.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Embedding complete"
        );
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.embed_model
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.chat("", prompt, 0.2, defaults::RAG_MAX_TOKENS).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.chat(system, prompt, 0.2, defaults::RAG_MAX_TOKENS).await
    }

    async fn generate_with_options(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        self.chat(system, prompt, temperature, max_tokens).await
    }

    fn model_name(&self) -> &str {
        &self.gen_model
    }
}

/// Image embedding via an Ollama multimodal embedding model.
pub struct OllamaImageEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OllamaImageEmbedder {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(defaults::EMBED_TIMEOUT_SECS))
                .build()
                .expect("HTTP client construction is infallible with static config"),
            base_url: settings.ollama_host.trim_end_matches('/').to_string(),
            model: settings.image_embed_model.clone(),
            dimension: settings.image_embedding_dim,
        }
    }
}

#[async_trait]
impl ImageEmbeddingBackend for OllamaImageEmbedder {
    async fn embed_images(&self, images: &[Vec<u8>]) -> Result<Vec<Vector>> {
        use base64::Engine;

        let mut out = Vec::with_capacity(images.len());
        for image in images {
            let b64 = base64::engine::general_purpose::STANDARD.encode(image);
            let response = self
                .client
                .post(format!("{}/api/embed", self.base_url))
                .json(&serde_json::json!({
                    "model": self.model,
                    "input": [b64],
                }))
                .send()
                .await
                .map_err(|e| Error::Embedding(format!("image embed failed: {e}")))?;

            if !response.status().is_success() {
                let status = response.status();
                return Err(Error::Embedding(format!("image embed returned {status}")));
            }

            let parsed: EmbedResponse = response
                .json()
                .await
                .map_err(|e| Error::Embedding(format!("image embed parse: {e}")))?;
            let mut vec = parsed
                .embeddings
                .into_iter()
                .next()
                .ok_or_else(|| Error::Embedding("empty image embedding response".into()))?;
            if vec.len() != self.dimension {
                return Err(Error::Validation(format!(
                    "image embedding dimension {} does not match configured {}",
                    vec.len(),
                    self.dimension
                )));
            }
            normalize_in_place(&mut vec);
            out.push(vec);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let backend = OllamaBackend::with_config(
            "http://localhost:11434/".into(),
            "all-minilm".into(),
            "llama3.2:latest".into(),
            384,
        );
        assert_eq!(backend.base_url, "http://localhost:11434");
    }

    #[test]
    fn reports_configured_dimension_and_models() {
        let backend = OllamaBackend::with_config(
            "http://localhost:11434".into(),
            "all-minilm".into(),
            "llama3.2:latest".into(),
            384,
        );
        assert_eq!(EmbeddingBackend::dimension(&backend), 384);
        assert_eq!(EmbeddingBackend::model_name(&backend), "all-minilm");
        assert_eq!(GenerationBackend::model_name(&backend), "llama3.2:latest");
    }

    #[tokio::test]
    async fn empty_embed_input_short_circuits() {
        let backend = OllamaBackend::with_config(
            // Unroutable address; must not be contacted for empty input.
            "http://192.0.2.1:1".into(),
            "all-minilm".into(),
            "llama3.2:latest".into(),
            384,
        );
        let out = backend.embed_texts(&[]).await.unwrap();
        assert!(out.is_empty());
    }
}
