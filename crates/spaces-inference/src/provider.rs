//! Runtime LLM provider selection.
//!
//! `LLM_PROVIDER` picks the backend at startup; `/search` and Deep Research
//! requests may carry a per-request override. The `oci` and `bedrock`
//! variants are recognized configuration but resolve to a configuration
//! error until their SDK integrations are compiled in. Callers treat every
//! chat failure as "answer without the LLM", so an unconfigured provider
//! degrades rather than breaking requests.

use std::sync::Arc;

use tracing::{debug, warn};

use spaces_core::{defaults, Error, GenerationBackend, Result, Settings};

use crate::mock::MockInferenceBackend;
use crate::ollama::OllamaBackend;
use crate::openai::OpenAIBackend;

/// Sampling options for one chat call.
#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            max_tokens: defaults::RAG_MAX_TOKENS,
            temperature: 0.2,
        }
    }
}

/// The configured generation provider.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Ollama(Arc<OllamaBackend>),
    Openai(Arc<OpenAIBackend>),
    Mock(Arc<MockInferenceBackend>),
    /// No provider configured; every chat returns `None`.
    None,
}

impl LlmProvider {
    /// Resolve a provider by name. Unknown names are a validation error;
    /// recognized-but-uncompiled providers (`oci`, `bedrock`) surface as a
    /// configuration error.
    pub fn resolve(name: &str, settings: &Settings) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(LlmProvider::None),
            "ollama" => Ok(LlmProvider::Ollama(Arc::new(OllamaBackend::from_settings(
                settings,
            )))),
            "openai" => OpenAIBackend::from_settings(settings)
                .map(|b| LlmProvider::Openai(Arc::new(b)))
                .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".into())),
            "oci" | "bedrock" => Err(Error::Config(format!(
                "provider '{name}' not compiled in (check feature flags)"
            ))),
            other => Err(Error::Validation(format!("unknown llm provider: {other}"))),
        }
    }

    /// Provider from the startup settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::resolve(&settings.llm_provider, settings)
    }

    /// Apply a per-request override, falling back to this provider when the
    /// override is unusable (matching the degrade-don't-fail policy).
    pub fn with_override(&self, name: Option<&str>, settings: &Settings) -> Self {
        match name {
            None => self.clone(),
            Some(n) => match Self::resolve(n, settings) {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(
                        subsystem = "inference",
                        component = "provider",
                        error = %e,
                        "Provider override unusable; keeping configured provider"
                    );
                    self.clone()
                }
            },
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, LlmProvider::None)
    }

    /// Provider label for logs and cache fingerprints.
    pub fn label(&self) -> &'static str {
        match self {
            LlmProvider::Ollama(_) => "ollama",
            LlmProvider::Openai(_) => "openai",
            LlmProvider::Mock(_) => "mock",
            LlmProvider::None => "none",
        }
    }

    /// Model identifier of the active backend.
    pub fn model_name(&self) -> &str {
        match self {
            LlmProvider::Ollama(b) => b.model_name(),
            LlmProvider::Openai(b) => b.model_name(),
            LlmProvider::Mock(b) => b.model_name(),
            LlmProvider::None => "none",
        }
    }

    /// Answer a question against a context block.
    ///
    /// Returns `None` when no provider is configured **or** the call fails;
    /// failures are logged and callers fall back to context-only answers.
    pub async fn chat(
        &self,
        question: &str,
        context: &str,
        system: &str,
        opts: ChatOptions,
    ) -> Option<String> {
        let backend: &dyn GenerationBackend = match self {
            LlmProvider::Ollama(b) => b.as_ref(),
            LlmProvider::Openai(b) => b.as_ref(),
            LlmProvider::Mock(b) => b.as_ref(),
            LlmProvider::None => return None,
        };

        let context = truncate_chars(context, defaults::GEN_CONTEXT_CHAR_LIMIT);
        let prompt = if context.is_empty() {
            question.to_string()
        } else {
            format!("Question: {question}\n\nContext:\n{context}")
        };

        match backend
            .generate_with_options(system, &prompt, opts.max_tokens, opts.temperature)
            .await
        {
            Ok(answer) if !answer.trim().is_empty() => Some(answer),
            Ok(_) => {
                debug!(
                    subsystem = "inference",
                    component = "provider",
                    provider = self.label(),
                    "Empty generation output"
                );
                None
            }
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "provider",
                    provider = self.label(),
                    error = %e,
                    "Generation failed; answering without the LLM"
                );
                None
            }
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_none() {
        let p = LlmProvider::resolve("none", &Settings::default()).unwrap();
        assert!(p.is_none());
        assert_eq!(p.label(), "none");
    }

    #[test]
    fn resolve_unknown_is_validation_error() {
        let err = LlmProvider::resolve("palm", &Settings::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn resolve_uncompiled_is_config_error() {
        for name in ["oci", "bedrock"] {
            let err = LlmProvider::resolve(name, &Settings::default()).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{name}");
        }
    }

    #[test]
    fn openai_without_key_is_config_error() {
        let err = LlmProvider::resolve("openai", &Settings::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn override_falls_back_on_error() {
        let base = LlmProvider::None;
        let resolved = base.with_override(Some("bedrock"), &Settings::default());
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn none_provider_yields_no_answer() {
        let p = LlmProvider::None;
        let out = p
            .chat("q", "ctx", "system", ChatOptions::default())
            .await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn mock_provider_answers() {
        let mock = MockInferenceBackend::new().with_fixed_response("grounded answer");
        let p = LlmProvider::Mock(Arc::new(mock));
        let out = p
            .chat("q", "ctx", "system", ChatOptions::default())
            .await;
        assert_eq!(out.as_deref(), Some("grounded answer"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("ééé", 2), "éé");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
