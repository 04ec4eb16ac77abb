//! The retrieval engine.
//!
//! Semantic, lexical, and hybrid retrieval over the configured backend
//! (search index or MetaStore), tenant-filtered, with revisioned-cache
//! fronting. Cached payloads hold only hit ids and normalized scores; the
//! content is rehydrated from the MetaStore on a cache hit.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use spaces_cache::{fingerprint, CacheKind, RevisionedCache};
use spaces_core::{
    ChunkHit, EmbeddingBackend, Error, ImageHit, Result, SearchBackend, Settings, Tenant, Vector,
};
use spaces_db::retrieval::RecencyParams;
use spaces_db::Database;
use spaces_index::{IndexFilter, RecencyDecay, SearchIndexClient};

use crate::mmr::mmr_rerank;
use crate::rrf::rrf_fuse;

/// Compact cached form of one hit.
#[derive(Debug, Serialize, Deserialize)]
struct CachedHit {
    d: i64,
    c: i32,
    s: Option<f32>,
    t: Option<f32>,
}

/// Options for hybrid retrieval.
#[derive(Debug, Clone, Copy, Default)]
pub struct HybridOptions {
    /// Collapse to the best chunk per document, returning up to `top_k`
    /// distinct documents.
    pub aggregate_documents: bool,
}

/// Tenant-scoped retrieval over the configured backend.
#[derive(Clone)]
pub struct Retriever {
    db: Database,
    index: Option<SearchIndexClient>,
    cache: RevisionedCache,
    embedder: Arc<dyn EmbeddingBackend>,
    settings: Arc<Settings>,
}

impl Retriever {
    pub fn new(
        db: Database,
        index: Option<SearchIndexClient>,
        cache: RevisionedCache,
        embedder: Arc<dyn EmbeddingBackend>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            db,
            index,
            cache,
            embedder,
            settings,
        }
    }

    /// The backend actually serving queries. `searchindex` degrades to the
    /// MetaStore when no index host is configured.
    fn effective_backend(&self) -> SearchBackend {
        match self.settings.search_backend {
            SearchBackend::SearchIndex if self.index.is_some() => SearchBackend::SearchIndex,
            SearchBackend::SearchIndex => {
                debug!(
                    subsystem = "search",
                    component = "retriever",
                    "Index backend configured but unreachable; using MetaStore"
                );
                SearchBackend::MetaStore
            }
            SearchBackend::MetaStore => SearchBackend::MetaStore,
        }
    }

    fn recency_index(&self) -> Option<RecencyDecay> {
        self.settings.recency_enable.then(|| RecencyDecay {
            scale_days: self.settings.recency_scale_days,
            weight: self.settings.recency_weight,
        })
    }

    fn recency_pg(&self) -> Option<RecencyParams> {
        self.settings.recency_enable.then(|| RecencyParams {
            scale_days: self.settings.recency_scale_days,
            weight: self.settings.recency_weight,
        })
    }

    /// Embed the query as a unit vector.
    pub async fn embed_query(&self, query: &str) -> Result<Vector> {
        let mut vectors = self.embedder.embed_texts(&[query.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Embedding("empty embedding response for query".into()))
    }

    // ========================================================================
    // Modes
    // ========================================================================

    /// KNN retrieval over the query embedding.
    pub async fn semantic(&self, query: &str, tenant: Tenant, top_k: usize) -> Result<Vec<ChunkHit>> {
        self.cached_search("sem", query, tenant, top_k, || async {
            let vector = self.embed_query(query).await?;
            match self.effective_backend() {
                SearchBackend::SearchIndex => {
                    let index = self.index.as_ref().expect("checked by effective_backend");
                    index
                        .knn_search(&vector, IndexFilter::from(tenant), top_k, self.recency_index())
                        .await
                }
                SearchBackend::MetaStore => {
                    self.db
                        .retrieval
                        .semantic_search(&vector, tenant, top_k, self.recency_pg())
                        .await
                }
            }
        })
        .await
    }

    /// Tokenized match with title/file-name boosts.
    pub async fn lexical(&self, query: &str, tenant: Tenant, top_k: usize) -> Result<Vec<ChunkHit>> {
        self.cached_search("lex", query, tenant, top_k, || async {
            match self.effective_backend() {
                SearchBackend::SearchIndex => {
                    let index = self.index.as_ref().expect("checked by effective_backend");
                    index
                        .lexical_search(query, IndexFilter::from(tenant), top_k, self.recency_index())
                        .await
                }
                SearchBackend::MetaStore => {
                    self.db
                        .retrieval
                        .lexical_search(
                            query,
                            tenant,
                            top_k,
                            &self.settings.fts_config,
                            self.recency_pg(),
                        )
                        .await
                }
            }
        })
        .await
    }

    /// Semantic and lexical in parallel, fused with RRF. Optional MMR
    /// diversification and document-level aggregation follow fusion.
    pub async fn hybrid(
        &self,
        query: &str,
        tenant: Tenant,
        top_k: usize,
        options: HybridOptions,
    ) -> Result<Vec<ChunkHit>> {
        let start = Instant::now();
        // Over-fetch both branches so fusion has material to rank.
        let branch_k = top_k.max(1) * 2;

        let (semantic, lexical) = tokio::join!(
            self.semantic(query, tenant, branch_k),
            self.lexical(query, tenant, branch_k),
        );

        // One failed branch degrades to the other rather than failing the
        // query; both failing propagates the semantic error.
        let (semantic, lexical) = match (semantic, lexical) {
            (Ok(s), Ok(l)) => (s, l),
            (Ok(s), Err(e)) => {
                warn!(subsystem = "search", component = "retriever", error = %e, "Lexical branch failed");
                (s, Vec::new())
            }
            (Err(e), Ok(l)) => {
                warn!(subsystem = "search", component = "retriever", error = %e, "Semantic branch failed");
                (Vec::new(), l)
            }
            (Err(e), Err(_)) => return Err(e),
        };

        let mut fused = rrf_fuse(vec![semantic, lexical], branch_k);

        if self.settings.hybrid_mmr_enable {
            fused = mmr_rerank(fused, self.settings.hybrid_mmr_lambda, branch_k);
        }

        if options.aggregate_documents {
            fused = best_chunk_per_document(fused);
        }
        fused.truncate(top_k);

        debug!(
            subsystem = "search",
            component = "retriever",
            op = "hybrid",
            user_id = tenant.user_id,
            result_count = fused.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Hybrid retrieval complete"
        );
        Ok(fused)
    }

    /// Image retrieval (caption/OCR lexical, optional vector, tag filter).
    pub async fn image_search(
        &self,
        query: Option<&str>,
        query_vec: Option<&Vector>,
        tags: &[String],
        tenant: Tenant,
        top_k: usize,
    ) -> Result<Vec<ImageHit>> {
        let mut filters: Vec<&str> = tags.iter().map(String::as_str).collect();
        filters.sort_unstable();
        let vec_marker = if query_vec.is_some() { "vec" } else { "novec" };
        filters.push(vec_marker);
        let fp = fingerprint(
            query.unwrap_or(""),
            &filters,
            self.effective_backend().as_str(),
            self.embedder.model_name(),
        );

        let key = self
            .cache
            .build_key(CacheKind::Image, tenant, top_k, &fp)
            .await;
        if let Some(key) = &key {
            if let Some(hits) = self.cache.get_json::<Vec<ImageHit>>(key).await {
                return Ok(hits);
            }
        }

        let hits = match self.effective_backend() {
            SearchBackend::SearchIndex => {
                let index = self.index.as_ref().expect("checked by effective_backend");
                match index
                    .image_search(query, query_vec, tags, IndexFilter::from(tenant), top_k)
                    .await
                {
                    Ok(hits) => hits,
                    Err(e) => {
                        // Query-path degradation: the MetaStore can answer.
                        warn!(
                            subsystem = "search",
                            component = "retriever",
                            error = %e,
                            "Index image search failed; falling back to MetaStore"
                        );
                        self.db
                            .retrieval
                            .image_search(query, query_vec, tags, tenant, top_k)
                            .await?
                    }
                }
            }
            SearchBackend::MetaStore => {
                self.db
                    .retrieval
                    .image_search(query, query_vec, tags, tenant, top_k)
                    .await?
            }
        };

        if let Some(key) = &key {
            self.cache.set_json(key, &hits, self.cache.ttl_results).await;
        }
        Ok(hits)
    }

    // ========================================================================
    // Cache plumbing
    // ========================================================================

    /// Consult the revisioned cache, else run `fetch` and store the compact
    /// id+score payload.
    async fn cached_search<F, Fut>(
        &self,
        mode: &str,
        query: &str,
        tenant: Tenant,
        top_k: usize,
        fetch: F,
    ) -> Result<Vec<ChunkHit>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<ChunkHit>>>,
    {
        let fp = fingerprint(
            query,
            &[mode],
            self.effective_backend().as_str(),
            self.embedder.model_name(),
        );
        let key = self
            .cache
            .build_key(CacheKind::Text, tenant, top_k, &fp)
            .await;

        if let Some(key) = &key {
            if let Some(cached) = self.cache.get_json::<Vec<CachedHit>>(key).await {
                match self.rehydrate(&cached, tenant).await {
                    Ok(hits) => return Ok(hits),
                    Err(e) => {
                        debug!(
                            subsystem = "search",
                            component = "retriever",
                            error = %e,
                            "Cache rehydration failed; querying backend"
                        );
                    }
                }
            }
        }

        let hits = fetch().await?;

        if let Some(key) = &key {
            let compact: Vec<CachedHit> = hits
                .iter()
                .map(|h| CachedHit {
                    d: h.document_id,
                    c: h.chunk_index,
                    s: h.score,
                    t: h.distance,
                })
                .collect();
            self.cache
                .set_json(key, &compact, self.cache.ttl_results)
                .await;
        }
        Ok(hits)
    }

    /// Rebuild full hits from a compact cached payload.
    async fn rehydrate(&self, cached: &[CachedHit], tenant: Tenant) -> Result<Vec<ChunkHit>> {
        let keys: Vec<(i64, i32)> = cached.iter().map(|h| (h.d, h.c)).collect();
        let contents = self
            .db
            .documents
            .get_chunks_by_keys(&keys, tenant.user_id)
            .await?;

        Ok(cached
            .iter()
            .filter_map(|entry| {
                let (content, file_name, source_type) =
                    contents.get(&(entry.d, entry.c)).cloned()?;
                Some(ChunkHit {
                    chunk_id: ChunkHit::synthetic_id(entry.d, entry.c),
                    document_id: entry.d,
                    chunk_index: entry.c,
                    content,
                    distance: entry.t,
                    score: entry.s,
                    file_name: Some(file_name),
                    source_type: Some(source_type),
                })
            })
            .collect())
    }
}

/// Keep the best-scored chunk per document, preserving rank order.
fn best_chunk_per_document(hits: Vec<ChunkHit>) -> Vec<ChunkHit> {
    let mut seen = std::collections::HashSet::new();
    hits.into_iter()
        .filter(|h| seen.insert(h.document_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(document_id: i64, chunk_index: i32, score: f32) -> ChunkHit {
        ChunkHit {
            chunk_id: ChunkHit::synthetic_id(document_id, chunk_index),
            document_id,
            chunk_index,
            content: String::new(),
            distance: None,
            score: Some(score),
            file_name: None,
            source_type: None,
        }
    }

    #[test]
    fn best_chunk_per_document_keeps_first() {
        let hits = vec![hit(1, 3, 0.9), hit(1, 0, 0.8), hit(2, 5, 0.7), hit(2, 1, 0.6)];
        let out = best_chunk_per_document(hits);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].dedupe_key(), (1, 3));
        assert_eq!(out[1].dedupe_key(), (2, 5));
    }

    #[test]
    fn cached_hit_payload_is_compact() {
        let payload = vec![CachedHit {
            d: 42,
            c: 1,
            s: Some(0.5),
            t: None,
        }];
        let json = serde_json::to_string(&payload).unwrap();
        // ids + scores only; no chunk content.
        assert!(json.contains("\"d\":42"));
        assert!(!json.contains("content"));
    }
}
