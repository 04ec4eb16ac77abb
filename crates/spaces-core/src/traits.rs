//! Capability traits for pluggable backends.
//!
//! These define the seams between the core and its external collaborators
//! (object storage, embedding/generation models, web search, extraction),
//! enabling pluggable implementations and deterministic test doubles.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::models::{Extraction, SourceType, Vector, WebHit};

// =============================================================================
// BLOB STORAGE
// =============================================================================

/// Object storage for original uploaded binaries.
///
/// Keys are caller-computed relative paths of the form
/// `{sanitized_email}/YYYY/MM/DD/HHMMSS/{file}`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store a binary under `key`, returning a retrievable URL.
    async fn put(&self, key: &str, data: &[u8]) -> Result<String>;

    /// Resolve a URL for a previously stored key.
    async fn get_url(&self, key: &str) -> Result<String>;

    /// Delete the object at `key`. Missing objects are not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

// =============================================================================
// INFERENCE
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed the given texts, one unit vector per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Expected dimension of produced vectors.
    fn dimension(&self) -> usize;

    /// Model identifier (participates in cache fingerprints).
    fn model_name(&self) -> &str;
}

/// Backend for embedding images into the image-model vector space.
#[async_trait]
pub trait ImageEmbeddingBackend: Send + Sync {
    /// Embed raw image bytes, one unit vector per input.
    async fn embed_images(&self, images: &[Vec<u8>]) -> Result<Vec<Vector>>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Backend for chat-style text generation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text for a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with a system instruction.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate with explicit sampling limits. Backends that cannot honor
    /// the limits fall back to their defaults.
    async fn generate_with_options(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let _ = (max_tokens, temperature);
        self.generate_with_system(system, prompt).await
    }

    /// Model identifier (participates in cache fingerprints).
    fn model_name(&self) -> &str;
}

// =============================================================================
// WEB SEARCH
// =============================================================================

/// Public web search + page fetch, used by Deep Research.
#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Search the public web, returning up to `k` hits.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<WebHit>>;

    /// Fetch a page and return its extracted text.
    async fn fetch(&self, url: &str) -> Result<String>;

    /// Provider label for logs and references.
    fn provider(&self) -> &str;
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Adapter extracting normalized content from one family of file types.
///
/// Adapters are registered in an `ExtractionRegistry` and dispatched on the
/// detected [`SourceType`].
#[async_trait]
pub trait ExtractionAdapter: Send + Sync {
    /// Source types this adapter handles.
    fn handles(&self, source_type: SourceType) -> bool;

    /// Extract content from raw file data.
    async fn extract(
        &self,
        data: &[u8],
        file_name: &str,
        source_type: SourceType,
        config: &JsonValue,
    ) -> Result<Extraction>;

    /// Human-readable adapter name.
    fn name(&self) -> &str;
}

// =============================================================================
// VECTOR HELPERS
// =============================================================================

/// Normalize a vector to unit length in place. Zero vectors are left as-is.
pub fn normalize_in_place(vec: &mut [f32]) {
    let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vec.iter_mut().for_each(|x| *x /= magnitude);
    }
}

/// Cosine similarity between two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a > 0.0 && mag_b > 0.0 {
        dot / (mag_a * mag_b)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        normalize_in_place(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        normalize_in_place(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn cosine_identical_is_one() {
        let a = vec![0.6, 0.8];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }
}
