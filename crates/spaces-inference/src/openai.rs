//! OpenAI chat-completions generation backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use spaces_core::{defaults, Error, GenerationBackend, Result, Settings};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI generation backend.
#[derive(Debug)]
pub struct OpenAIBackend {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAIBackend {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(defaults::GEN_TIMEOUT_SECS))
                .build()
                .expect("HTTP client construction is infallible with static config"),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| OPENAI_BASE_URL.to_string()),
            api_key,
            model,
        }
    }

    /// Build from settings; `None` when no API key is configured.
    pub fn from_settings(settings: &Settings) -> Option<Self> {
        settings
            .openai_api_key
            .clone()
            .map(|key| Self::new(key, settings.openai_model.clone()))
    }
}

impl OpenAIBackend {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let start = Instant::now();
        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: prompt,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages,
                temperature,
                max_tokens,
            })
            .send()
            .await
            .map_err(|e| Error::Inference(format!("openai request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Inference(format!("openai returned {status}: {body}")));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("openai response parse: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Inference("openai returned no choices".into()))?;

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "generate",
            model = %self.model,
            response_len = content.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Generation complete"
        );
        Ok(content)
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.complete(system, prompt, defaults::RAG_MAX_TOKENS, 0.2).await
    }

    async fn generate_with_options(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        self.complete(system, prompt, max_tokens, temperature).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_settings_requires_api_key() {
        let settings = Settings::default();
        assert!(OpenAIBackend::from_settings(&settings).is_none());

        let settings = Settings {
            openai_api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let backend = OpenAIBackend::from_settings(&settings).unwrap();
        assert_eq!(backend.model_name(), "gpt-4o-mini");
    }
}
