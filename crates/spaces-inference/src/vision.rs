//! Image captioning with primary/fallback model selection.
//!
//! The large caption model gets a hard per-call timeout; on timeout or
//! failure the small model answers instead and the outcome records
//! `caption_source = fallback`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use spaces_core::{CaptionSource, Error, Result, Settings};

const CAPTION_PROMPT: &str =
    "Describe this image in one concise sentence. Mention the main subject and setting.";

/// Backend describing images with a vision LLM.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Describe an image given raw bytes.
    async fn describe_image(&self, image_data: &[u8], prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Ollama vision backend (llava, qwen-vl family).
pub struct OllamaVisionBackend {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaVisionBackend {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait]
impl VisionBackend for OllamaVisionBackend {
    async fn describe_image(&self, image_data: &[u8], prompt: &str) -> Result<String> {
        use base64::Engine;
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(image_data);

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&serde_json::json!({
                "model": self.model,
                "prompt": prompt,
                "images": [image_b64],
                "stream": false,
            }))
            .send()
            .await
            .map_err(|e| Error::Inference(format!("vision request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Inference(format!("vision model returned {status}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Inference(format!("vision response parse: {e}")))?;
        Ok(parsed.response.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// A produced caption and which model produced it.
#[derive(Debug, Clone)]
pub struct CaptionOutcome {
    pub caption: String,
    pub source: CaptionSource,
}

/// Primary/fallback captioner.
pub struct Captioner {
    primary: Option<Box<dyn VisionBackend>>,
    fallback: Option<Box<dyn VisionBackend>>,
    timeout: Duration,
}

impl Captioner {
    pub fn new(
        primary: Option<Box<dyn VisionBackend>>,
        fallback: Option<Box<dyn VisionBackend>>,
        timeout: Duration,
    ) -> Self {
        Self {
            primary,
            fallback,
            timeout,
        }
    }

    /// Build from settings; disabled (all-`None` captions) when no caption
    /// model is configured.
    pub fn from_settings(settings: &Settings) -> Self {
        let primary = settings.caption_model.clone().map(|m| {
            Box::new(OllamaVisionBackend::new(settings.ollama_host.clone(), m))
                as Box<dyn VisionBackend>
        });
        let fallback = settings.caption_model_small.clone().map(|m| {
            Box::new(OllamaVisionBackend::new(settings.ollama_host.clone(), m))
                as Box<dyn VisionBackend>
        });
        Self::new(
            primary,
            fallback,
            Duration::from_secs(settings.caption_timeout_secs),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.primary.is_some() || self.fallback.is_some()
    }

    /// Caption an image. The primary model runs under the configured
    /// timeout; any failure falls back to the small model. Returns `None`
    /// when captioning is disabled or both models fail.
    pub async fn caption(&self, image_data: &[u8]) -> Option<CaptionOutcome> {
        if let Some(primary) = &self.primary {
            match tokio::time::timeout(self.timeout, primary.describe_image(image_data, CAPTION_PROMPT))
                .await
            {
                Ok(Ok(caption)) if !caption.is_empty() => {
                    debug!(
                        subsystem = "inference",
                        component = "captioner",
                        model = primary.model_name(),
                        "Primary caption produced"
                    );
                    return Some(CaptionOutcome {
                        caption,
                        source: CaptionSource::Primary,
                    });
                }
                Ok(Ok(_)) => {
                    warn!(
                        subsystem = "inference",
                        component = "captioner",
                        model = primary.model_name(),
                        "Primary caption empty; trying fallback"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        subsystem = "inference",
                        component = "captioner",
                        model = primary.model_name(),
                        error = %e,
                        "Primary caption failed; trying fallback"
                    );
                }
                Err(_) => {
                    warn!(
                        subsystem = "inference",
                        component = "captioner",
                        model = primary.model_name(),
                        timeout_secs = self.timeout.as_secs(),
                        "Primary caption timed out; trying fallback"
                    );
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            match tokio::time::timeout(
                self.timeout,
                fallback.describe_image(image_data, CAPTION_PROMPT),
            )
            .await
            {
                Ok(Ok(caption)) if !caption.is_empty() => {
                    return Some(CaptionOutcome {
                        caption,
                        source: CaptionSource::Fallback,
                    });
                }
                Ok(Ok(_)) | Ok(Err(_)) | Err(_) => {
                    warn!(
                        subsystem = "inference",
                        component = "captioner",
                        model = fallback.model_name(),
                        "Fallback caption failed"
                    );
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubVision {
        reply: Option<String>,
        delay: Duration,
        name: &'static str,
    }

    #[async_trait]
    impl VisionBackend for StubVision {
        async fn describe_image(&self, _image_data: &[u8], _prompt: &str) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            self.reply
                .clone()
                .ok_or_else(|| Error::Inference("stub failure".into()))
        }

        fn model_name(&self) -> &str {
            self.name
        }
    }

    #[tokio::test]
    async fn primary_caption_wins_when_fast() {
        let captioner = Captioner::new(
            Some(Box::new(StubVision {
                reply: Some("a red barn".into()),
                delay: Duration::ZERO,
                name: "big",
            })),
            Some(Box::new(StubVision {
                reply: Some("barn".into()),
                delay: Duration::ZERO,
                name: "small",
            })),
            Duration::from_millis(200),
        );
        let out = captioner.caption(b"img").await.unwrap();
        assert_eq!(out.caption, "a red barn");
        assert_eq!(out.source, CaptionSource::Primary);
    }

    #[tokio::test]
    async fn timeout_falls_back_to_small_model() {
        let captioner = Captioner::new(
            Some(Box::new(StubVision {
                reply: Some("never arrives".into()),
                delay: Duration::from_secs(5),
                name: "big",
            })),
            Some(Box::new(StubVision {
                reply: Some("barn".into()),
                delay: Duration::ZERO,
                name: "small",
            })),
            Duration::from_millis(50),
        );
        let out = captioner.caption(b"img").await.unwrap();
        assert_eq!(out.caption, "barn");
        assert_eq!(out.source, CaptionSource::Fallback);
    }

    #[tokio::test]
    async fn failure_of_both_yields_none() {
        let captioner = Captioner::new(
            Some(Box::new(StubVision {
                reply: None,
                delay: Duration::ZERO,
                name: "big",
            })),
            Some(Box::new(StubVision {
                reply: None,
                delay: Duration::ZERO,
                name: "small",
            })),
            Duration::from_millis(50),
        );
        assert!(captioner.caption(b"img").await.is_none());
    }

    #[tokio::test]
    async fn disabled_captioner_returns_none() {
        let captioner = Captioner::new(None, None, Duration::from_millis(50));
        assert!(!captioner.is_enabled());
        assert!(captioner.caption(b"img").await.is_none());
    }
}
