//! # spaces-inference
//!
//! Embedding and generation backends for SpacesAI.
//!
//! Concrete implementations of the [`spaces_core::EmbeddingBackend`] and
//! [`spaces_core::GenerationBackend`] capabilities:
//! - **Ollama**: local models over REST (embedding + generation + vision)
//! - **OpenAI**: chat-completions generation
//! - **Mock**: deterministic backend for tests
//!
//! Provider selection is runtime configuration (`LLM_PROVIDER`), dispatched
//! through [`LlmProvider`].

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod vision;

pub use mock::{MockEmbeddingGenerator, MockInferenceBackend};
pub use ollama::{OllamaBackend, OllamaImageEmbedder};
pub use openai::OpenAIBackend;
pub use provider::{ChatOptions, LlmProvider};
pub use vision::{CaptionOutcome, Captioner, OllamaVisionBackend, VisionBackend};
