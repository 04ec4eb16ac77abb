//! Deterministic mock backend for tests.
//!
//! Embeddings hash the input text into a unit vector (same text, same
//! vector); generation replays configured responses. Implements the real
//! capability traits so whole pipelines can run without models.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use spaces_core::traits::normalize_in_place;
use spaces_core::{
    EmbeddingBackend, Error, GenerationBackend, ImageEmbeddingBackend, Result, Vector,
};

/// Logged call for assertions.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    image_dimension: usize,
    fixed_responses: HashMap<String, String>,
    default_response: String,
    latency_ms: u64,
    failure_rate: f64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            image_dimension: 768,
            fixed_responses: HashMap::new(),
            default_response: "Mock response".to_string(),
            latency_ms: 0,
            failure_rate: 0.0,
        }
    }
}

/// Mock inference backend.
#[derive(Debug, Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInferenceBackend {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Fixed response for every generation request.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Response for prompts *containing* the given needle (checked before
    /// the default response; first configured match wins).
    pub fn with_response_for(
        mut self,
        needle: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .fixed_responses
            .insert(needle.into(), output.into());
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Probability in `[0, 1]` that a call fails (error-path testing).
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn log(&self, operation: &str, input: &str) {
        self.call_log.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
        });
    }

    fn maybe_fail(&self, what: &str) -> Result<()> {
        use rand::Rng;
        if self.config.failure_rate > 0.0
            && rand::thread_rng().gen::<f64>() < self.config.failure_rate
        {
            return Err(Error::Transient(format!("simulated {what} failure")));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.simulate_latency().await;
        self.maybe_fail("embedding")?;
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            self.log("embed", text);
            out.push(MockEmbeddingGenerator::generate(
                text,
                self.config.dimension,
            ));
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl ImageEmbeddingBackend for MockInferenceBackend {
    async fn embed_images(&self, images: &[Vec<u8>]) -> Result<Vec<Vector>> {
        self.simulate_latency().await;
        self.maybe_fail("image embedding")?;
        Ok(images
            .iter()
            .map(|bytes| {
                self.log("embed_image", &format!("{} bytes", bytes.len()));
                MockEmbeddingGenerator::generate_from_bytes(bytes, self.config.image_dimension)
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.image_dimension
    }

    fn model_name(&self) -> &str {
        "mock-image-embed"
    }
}

#[async_trait]
impl GenerationBackend for MockInferenceBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        self.simulate_latency().await;
        self.maybe_fail("generation")?;
        self.log("generate", prompt);

        for (needle, output) in &self.config.fixed_responses {
            if prompt.contains(needle.as_str()) {
                return Ok(output.clone());
            }
        }
        Ok(self.config.default_response.clone())
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}

/// Deterministic embedding generator.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Character-hash a string into a unit vector; identical text always
    /// produces an identical vector, and shared tokens produce similarity.
    pub fn generate(text: &str, dimension: usize) -> Vector {
        let mut vec = vec![0.0f32; dimension];
        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }
        normalize_in_place(&mut vec);
        vec
    }

    /// Deterministic vector from raw bytes (image inputs).
    pub fn generate_from_bytes(bytes: &[u8], dimension: usize) -> Vector {
        let mut vec = vec![0.0f32; dimension];
        for (i, b) in bytes.iter().enumerate() {
            let idx = (*b as usize + i) % dimension;
            vec[idx] += 0.1;
        }
        normalize_in_place(&mut vec);
        vec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spaces_core::traits::cosine_similarity;

    #[tokio::test]
    async fn embeddings_are_deterministic_and_unit() {
        let backend = MockInferenceBackend::new();
        let a = backend
            .embed_texts(&["quantum computing".to_string()])
            .await
            .unwrap();
        let b = backend
            .embed_texts(&["quantum computing".to_string()])
            .await
            .unwrap();
        assert_eq!(a, b);
        let norm: f32 = a[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn different_texts_differ() {
        let backend = MockInferenceBackend::new();
        let out = backend
            .embed_texts(&["alpha".to_string(), "omega".to_string()])
            .await
            .unwrap();
        assert!(cosine_similarity(&out[0], &out[1]) < 0.999);
    }

    #[tokio::test]
    async fn generation_uses_needle_mapping() {
        let backend = MockInferenceBackend::new()
            .with_fixed_response("default")
            .with_response_for("sub-questions", "1. What is X?\n2. What is Y?");

        let plan = backend
            .generate("Produce sub-questions for: topic")
            .await
            .unwrap();
        assert!(plan.contains("What is X?"));

        let other = backend.generate("unrelated").await.unwrap();
        assert_eq!(other, "default");
    }

    #[tokio::test]
    async fn failure_rate_one_always_fails() {
        let backend = MockInferenceBackend::new().with_failure_rate(1.0);
        assert!(backend.embed_texts(&["x".to_string()]).await.is_err());
        assert!(backend.generate("x").await.is_err());
    }

    #[tokio::test]
    async fn call_log_records_operations() {
        let backend = MockInferenceBackend::new();
        backend
            .embed_texts(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        backend.generate("p").await.unwrap();
        assert_eq!(backend.call_count("embed"), 2);
        assert_eq!(backend.call_count("generate"), 1);
    }

    #[test]
    fn image_dimension_defaults_to_768() {
        let backend = MockInferenceBackend::new();
        assert_eq!(ImageEmbeddingBackend::dimension(&backend), 768);
        assert_eq!(EmbeddingBackend::dimension(&backend), 384);
    }
}
