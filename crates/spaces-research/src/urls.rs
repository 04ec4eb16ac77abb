//! User-supplied URL evidence.
//!
//! Pages named in an `ask` are fetched, chunked, embedded, and ranked
//! against the retrieval seed in-process; the best chunks join the context
//! as the `url` group. Fetches respect the remaining budget and the
//! per-fetch timeout; a failed page is skipped, never fatal.

use std::sync::Arc;

use tracing::warn;

use spaces_core::traits::cosine_similarity;
use spaces_core::{ChunkParams, EmbeddingBackend, RecursiveChunker, WebSearch};

use crate::budget::Budget;

/// One ranked URL context block.
#[derive(Debug, Clone)]
pub struct UrlContext {
    pub url: String,
    pub text: String,
    pub score: f32,
}

/// Fetch and rank user URLs against the query. Returns up to `top_k`
/// chunks across all pages, best first.
pub async fn gather_url_contexts(
    web: &Arc<dyn WebSearch>,
    embedder: &Arc<dyn EmbeddingBackend>,
    urls: &[String],
    query: &str,
    top_k: usize,
    budget: &Budget,
) -> Vec<UrlContext> {
    if urls.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let query_vec = match embedder.embed_texts(&[query.to_string()]).await {
        Ok(mut v) if !v.is_empty() => v.remove(0),
        _ => return Vec::new(),
    };

    let chunker = RecursiveChunker::new(ChunkParams::new(1500, 150));
    let mut candidates: Vec<UrlContext> = Vec::new();

    for url in urls {
        if budget.exhausted() {
            break;
        }
        let text = match web.fetch(url).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => continue,
            Err(e) => {
                warn!(
                    subsystem = "research",
                    component = "urls",
                    url = %url,
                    error = %e,
                    "URL fetch failed"
                );
                continue;
            }
        };

        let chunks = chunker.chunk(&text);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let Ok(vectors) = embedder.embed_texts(&texts).await else {
            continue;
        };

        for (chunk, vector) in chunks.iter().zip(&vectors) {
            candidates.push(UrlContext {
                url: url.clone(),
                text: chunk.text.clone(),
                score: cosine_similarity(&query_vec, vector),
            });
        }
    }

    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(top_k);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use spaces_core::{Result, WebHit};
    use spaces_inference::MockInferenceBackend;
    use std::time::Duration;

    struct StubWeb {
        pages: std::collections::HashMap<String, String>,
    }

    #[async_trait]
    impl WebSearch for StubWeb {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<WebHit>> {
            Ok(Vec::new())
        }

        async fn fetch(&self, url: &str) -> Result<String> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| spaces_core::Error::NotFound(url.to_string()))
        }

        fn provider(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn ranks_fetched_chunks_against_query() {
        let mut pages = std::collections::HashMap::new();
        pages.insert(
            "https://a.example".to_string(),
            "cross border transfers require safeguards".to_string(),
        );
        pages.insert(
            "https://b.example".to_string(),
            "completely unrelated cooking recipe".to_string(),
        );
        let web: Arc<dyn WebSearch> = Arc::new(StubWeb { pages });
        let embedder: Arc<dyn EmbeddingBackend> = Arc::new(MockInferenceBackend::new());

        let out = gather_url_contexts(
            &web,
            &embedder,
            &[
                "https://a.example".to_string(),
                "https://b.example".to_string(),
                "https://missing.example".to_string(),
            ],
            "cross border transfers",
            2,
            &Budget::new(Duration::from_secs(30)),
        )
        .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "https://a.example");
        assert!(out[0].score >= out[1].score);
    }

    #[tokio::test]
    async fn empty_inputs_yield_nothing() {
        let web: Arc<dyn WebSearch> = Arc::new(StubWeb {
            pages: Default::default(),
        });
        let embedder: Arc<dyn EmbeddingBackend> = Arc::new(MockInferenceBackend::new());
        let out = gather_url_contexts(
            &web,
            &embedder,
            &[],
            "q",
            5,
            &Budget::new(Duration::from_secs(30)),
        )
        .await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn exhausted_budget_skips_fetches() {
        let mut pages = std::collections::HashMap::new();
        pages.insert("https://a.example".to_string(), "content".to_string());
        let web: Arc<dyn WebSearch> = Arc::new(StubWeb { pages });
        let embedder: Arc<dyn EmbeddingBackend> = Arc::new(MockInferenceBackend::new());
        let out = gather_url_contexts(
            &web,
            &embedder,
            &["https://a.example".to_string()],
            "q",
            5,
            &Budget::new(Duration::ZERO),
        )
        .await;
        assert!(out.is_empty());
    }
}
