//! Single-shot RAG synthesis.
//!
//! Deduplicates hits, assembles a labeled context block, and calls the
//! generator with a strict grounding prompt. Answers are cached under a key
//! derived from the query, the hit id sequence, the context, and the model,
//! so identical retrievals serve identical answers until invalidated.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use spaces_cache::{fingerprint, CacheKind, RevisionedCache};
use spaces_core::textnorm::normalize_whitespace;
use spaces_core::{defaults, ChunkHit, Tenant};
use spaces_inference::{ChatOptions, LlmProvider};

/// Guardrail prompt for grounded answering.
const SYNTHESIS_SYSTEM_PROMPT: &str = "Answer directly from the provided context. \
If insufficient, say 'No answer found in the provided context.' \
Do not ask for more input.";

/// A synthesized answer and whether a model produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub used_llm: bool,
}

/// Builds grounded answers from retrieval hits.
#[derive(Clone)]
pub struct Synthesizer {
    provider: LlmProvider,
    cache: RevisionedCache,
}

impl Synthesizer {
    pub fn new(provider: LlmProvider, cache: RevisionedCache) -> Self {
        Self { provider, cache }
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// A synthesizer using a per-request provider override (unusable
    /// overrides keep the configured provider).
    pub fn with_provider_override(
        &self,
        name: Option<&str>,
        settings: &spaces_core::Settings,
    ) -> Self {
        Self {
            provider: self.provider.with_override(name, settings),
            cache: self.cache.clone(),
        }
    }

    /// Build the labeled context block from deduplicated hits.
    pub fn build_context(hits: &[ChunkHit]) -> String {
        let mut seen = std::collections::HashSet::new();
        let mut blocks = Vec::new();
        for hit in hits {
            if !seen.insert(hit.dedupe_key()) {
                continue;
            }
            let label = match &hit.file_name {
                Some(name) => format!("[{} · chunk {}]", name, hit.chunk_index),
                None => format!("[doc {} · chunk {}]", hit.document_id, hit.chunk_index),
            };
            blocks.push(format!("{label}\n{}", normalize_whitespace(&hit.content)));
        }
        blocks.join("\n\n")
    }

    /// Answer `query` from `hits`. A missing/failed generator degrades to a
    /// context-only answer with `used_llm = false`.
    pub async fn synthesize(&self, query: &str, hits: &[ChunkHit], tenant: Tenant) -> RagAnswer {
        let start = Instant::now();
        let context = Self::build_context(hits);

        let id_sequence: Vec<String> = hits
            .iter()
            .map(|h| format!("{}-{}", h.document_id, h.chunk_index))
            .collect();
        let mut filters: Vec<&str> = id_sequence.iter().map(String::as_str).collect();
        filters.push(&context);
        let fp = fingerprint(
            query,
            &filters,
            self.provider.label(),
            self.provider.model_name(),
        );

        let key = self
            .cache
            .build_key(CacheKind::Llm, tenant, hits.len(), &fp)
            .await;
        if let Some(key) = &key {
            if let Some(cached) = self.cache.get_json::<RagAnswer>(key).await {
                debug!(
                    subsystem = "search",
                    component = "synthesizer",
                    op = "synthesize",
                    user_id = tenant.user_id,
                    "Answer served from cache"
                );
                return cached;
            }
        }

        let generated = self
            .provider
            .chat(query, &context, SYNTHESIS_SYSTEM_PROMPT, ChatOptions::default())
            .await;

        let result = match generated {
            Some(answer) => RagAnswer {
                answer,
                used_llm: true,
            },
            // LLM down or unconfigured: hand back the evidence itself.
            None => RagAnswer {
                answer: context.clone(),
                used_llm: false,
            },
        };

        if let Some(key) = &key {
            self.cache
                .set_json(key, &result, self.cache.ttl_answers)
                .await;
        }

        info!(
            subsystem = "search",
            component = "synthesizer",
            op = "synthesize",
            user_id = tenant.user_id,
            used_llm = result.used_llm,
            answer_len = result.answer.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Synthesis complete"
        );
        result
    }
}

/// Default answer-cache TTL; re-exported for configuration display.
pub const ANSWER_TTL_SECS: u64 = defaults::CACHE_TTL_LLM_SECS;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use spaces_inference::MockInferenceBackend;

    fn hit(document_id: i64, chunk_index: i32, content: &str, file: Option<&str>) -> ChunkHit {
        ChunkHit {
            chunk_id: ChunkHit::synthetic_id(document_id, chunk_index),
            document_id,
            chunk_index,
            content: content.to_string(),
            distance: None,
            score: Some(1.0),
            file_name: file.map(String::from),
            source_type: None,
        }
    }

    #[test]
    fn context_dedupes_and_labels() {
        let hits = vec![
            hit(1, 0, "first   chunk", Some("privacy.pdf")),
            hit(1, 0, "duplicate of the first", Some("privacy.pdf")),
            hit(2, 3, "second doc", None),
        ];
        let ctx = Synthesizer::build_context(&hits);
        assert!(ctx.contains("[privacy.pdf · chunk 0]\nfirst chunk"));
        assert!(ctx.contains("[doc 2 · chunk 3]"));
        assert!(!ctx.contains("duplicate of the first"));
    }

    #[test]
    fn context_preserves_best_scored_order() {
        let hits = vec![
            hit(9, 1, "ranked first", Some("a.txt")),
            hit(3, 0, "ranked second", Some("b.txt")),
        ];
        let ctx = Synthesizer::build_context(&hits);
        let first = ctx.find("ranked first").unwrap();
        let second = ctx.find("ranked second").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn llm_answer_marks_used_llm() {
        let mock = MockInferenceBackend::new().with_fixed_response("The answer is 42.");
        let synth = Synthesizer::new(
            LlmProvider::Mock(Arc::new(mock)),
            RevisionedCache::disabled(),
        );
        let out = synth
            .synthesize("meaning?", &[hit(1, 0, "evidence", None)], Tenant::new(1, None))
            .await;
        assert!(out.used_llm);
        assert_eq!(out.answer, "The answer is 42.");
    }

    #[tokio::test]
    async fn missing_llm_degrades_to_context() {
        let synth = Synthesizer::new(LlmProvider::None, RevisionedCache::disabled());
        let out = synth
            .synthesize(
                "meaning?",
                &[hit(1, 0, "the evidence text", Some("doc.txt"))],
                Tenant::new(1, None),
            )
            .await;
        assert!(!out.used_llm);
        assert!(out.answer.contains("the evidence text"));
    }
}
