//! REST client for the OpenSearch-compatible backend.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use spaces_core::ranking::normalize_hit_scores;
use spaces_core::{ChunkHit, Error, ImageHit, Result, Settings, Vector};

use crate::types::{BulkReport, IndexFilter, IndexedChunk, IndexedImage, RecencyDecay};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: HitsEnvelope,
}

#[derive(Debug, Default, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source", default)]
    source: JsonValue,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<JsonValue>,
}

/// Client for the chunk and image indexes.
#[derive(Clone)]
pub struct SearchIndexClient {
    http: Client,
    base_url: String,
    auth: Option<(String, String)>,
    chunk_index: String,
    image_index: String,
    dim: usize,
    image_dim: usize,
    shards: u32,
    replicas: u32,
    boost_text: f32,
    boost_title: f32,
    boost_file_name: f32,
}

impl SearchIndexClient {
    /// Build from settings. Returns `None` when no index host is configured
    /// (the `metastore` backend serves retrieval in that case).
    pub fn from_settings(settings: &Settings) -> Result<Option<Self>> {
        let Some(host) = settings.index_host.as_deref() else {
            return Ok(None);
        };

        let http = Client::builder()
            .timeout(settings.index_timeout())
            .build()
            .map_err(|e| Error::Config(format!("search index HTTP client: {e}")))?;

        let auth = match (&settings.index_user, &settings.index_password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        };

        Ok(Some(Self {
            http,
            base_url: host.trim_end_matches('/').to_string(),
            auth,
            chunk_index: settings.chunk_index.clone(),
            image_index: settings.image_index.clone(),
            dim: settings.embedding_dim,
            image_dim: settings.image_embedding_dim,
            shards: settings.index_shards,
            replicas: settings.index_replicas,
            boost_text: settings.boost_text,
            boost_title: settings.boost_title,
            boost_file_name: settings.boost_file_name,
        }))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some((user, pass)) = &self.auth {
            req = req.basic_auth(user, Some(pass));
        }
        req
    }

    // ========================================================================
    // Index lifecycle
    // ========================================================================

    /// Create both indexes if absent and verify vector dimensions.
    /// Idempotent; a dimension mismatch fails with a clear diagnostic.
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.ensure_index(&self.chunk_index.clone(), self.chunk_mapping(), self.dim)
            .await?;
        self.ensure_index(
            &self.image_index.clone(),
            self.image_mapping(),
            self.image_dim,
        )
        .await?;
        Ok(())
    }

    async fn ensure_index(&self, index: &str, mapping: JsonValue, dim: usize) -> Result<()> {
        let head = self
            .request(reqwest::Method::HEAD, &format!("/{index}"))
            .send()
            .await
            .map_err(|e| Error::Transient(format!("index HEAD failed: {e}")))?;

        if head.status().is_success() {
            self.verify_dimension(index, dim).await?;
            return Ok(());
        }

        let resp = self
            .request(reqwest::Method::PUT, &format!("/{index}"))
            .json(&mapping)
            .send()
            .await
            .map_err(|e| Error::Transient(format!("index create failed: {e}")))?;

        if resp.status().is_success() {
            info!(
                subsystem = "index",
                op = "ensure",
                index,
                dimension = dim,
                "Created search index"
            );
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        // Lost a create race with a concurrent starter; the index exists now.
        if body.contains("resource_already_exists_exception") {
            self.verify_dimension(index, dim).await?;
            return Ok(());
        }
        Err(Error::Search(format!("index create for {index}: {body}")))
    }

    /// Compare the mapped `vector` dimension against the configured one.
    async fn verify_dimension(&self, index: &str, expected: usize) -> Result<()> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/{index}/_mapping"))
            .send()
            .await
            .map_err(|e| Error::Transient(format!("mapping fetch failed: {e}")))?;
        let body: JsonValue = resp.json().await.map_err(Error::from)?;

        let mapped = body
            .get(index)
            .and_then(|m| m.pointer("/mappings/properties/vector/dimension"))
            .and_then(JsonValue::as_u64);

        match mapped {
            Some(dim) if dim as usize != expected => Err(Error::Config(format!(
                "index {index} maps vector dimension {dim} but the embedding model produces {expected}; \
                 delete the index and reindex, or restore the matching model"
            ))),
            _ => Ok(()),
        }
    }

    fn chunk_mapping(&self) -> JsonValue {
        json!({
            "settings": {
                "index": {
                    "knn": true,
                    "number_of_shards": self.shards,
                    "number_of_replicas": self.replicas
                }
            },
            "mappings": {
                "properties": {
                    "doc_id": {"type": "long"},
                    "chunk_index": {"type": "integer"},
                    "text": {"type": "text"},
                    "title": {"type": "text"},
                    "file_name": {"type": "text"},
                    "source_type": {"type": "keyword"},
                    "user_id": {"type": "long"},
                    "space_id": {"type": "long"},
                    "created_at": {"type": "date"},
                    "vector": {
                        "type": "knn_vector",
                        "dimension": self.dim,
                        "method": {"name": "hnsw", "engine": "lucene", "space_type": "cosinesimil"}
                    }
                }
            }
        })
    }

    fn image_mapping(&self) -> JsonValue {
        json!({
            "settings": {
                "index": {
                    "knn": true,
                    "number_of_shards": self.shards,
                    "number_of_replicas": self.replicas
                }
            },
            "mappings": {
                "properties": {
                    "image_id": {"type": "long"},
                    "doc_id": {"type": "long"},
                    "file_path": {"type": "keyword"},
                    "thumbnail_path": {"type": "keyword"},
                    "caption": {"type": "text"},
                    "ocr_text": {"type": "text"},
                    "tags": {"type": "keyword"},
                    "user_id": {"type": "long"},
                    "space_id": {"type": "long"},
                    "width": {"type": "integer"},
                    "height": {"type": "integer"},
                    "created_at": {"type": "date"},
                    "vector": {
                        "type": "knn_vector",
                        "dimension": self.image_dim,
                        "method": {"name": "hnsw", "engine": "lucene", "space_type": "cosinesimil"}
                    }
                }
            }
        })
    }

    // ========================================================================
    // Indexing
    // ========================================================================

    /// Bulk-index chunk documents. Vector dimensions are validated before
    /// anything is sent, so one document's batch never partially applies
    /// because of a malformed vector.
    pub async fn bulk_index_chunks(&self, docs: &[IndexedChunk]) -> Result<BulkReport> {
        for doc in docs {
            if let Some(v) = &doc.vector {
                self.check_dim(v, self.dim)?;
            }
        }
        let chunk_index = self.chunk_index.clone();
        let lines: Vec<String> = docs
            .iter()
            .map(|doc| {
                let action = json!({"index": {"_index": chunk_index, "_id": doc.index_id()}});
                Ok(format!(
                    "{}\n{}",
                    serde_json::to_string(&action)?,
                    serde_json::to_string(doc)?
                ))
            })
            .collect::<Result<_>>()?;
        self.bulk(lines, docs.len()).await
    }

    /// Bulk-index image documents.
    pub async fn bulk_index_images(&self, docs: &[IndexedImage]) -> Result<BulkReport> {
        for doc in docs {
            if let Some(v) = &doc.vector {
                self.check_dim(v, self.image_dim)?;
            }
        }
        let image_index = self.image_index.clone();
        let lines: Vec<String> = docs
            .iter()
            .map(|doc| {
                let action = json!({"index": {"_index": image_index, "_id": doc.index_id()}});
                Ok(format!(
                    "{}\n{}",
                    serde_json::to_string(&action)?,
                    serde_json::to_string(doc)?
                ))
            })
            .collect::<Result<_>>()?;
        self.bulk(lines, docs.len()).await
    }

    async fn bulk(&self, lines: Vec<String>, total: usize) -> Result<BulkReport> {
        if lines.is_empty() {
            return Ok(BulkReport::default());
        }
        let start = Instant::now();
        let body = format!("{}\n", lines.join("\n"));

        let resp = self
            .request(reqwest::Method::POST, "/_bulk")
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Transient(format!("bulk request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Search(format!("bulk returned {status}: {text}")));
        }

        let parsed: BulkResponse = resp.json().await.map_err(Error::from)?;
        let mut report = BulkReport {
            indexed: total,
            failed: Vec::new(),
        };
        if parsed.errors {
            for item in &parsed.items {
                let entry = item.get("index").unwrap_or(item);
                if entry.get("error").is_some() {
                    let id = entry
                        .get("_id")
                        .and_then(JsonValue::as_str)
                        .unwrap_or("?")
                        .to_string();
                    report.failed.push(id);
                }
            }
            report.indexed = total.saturating_sub(report.failed.len());
            warn!(
                subsystem = "index",
                op = "bulk",
                failed = report.failed.len(),
                "Bulk indexing had per-document failures"
            );
        }

        debug!(
            subsystem = "index",
            op = "bulk",
            result_count = report.indexed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Bulk indexing complete"
        );
        Ok(report)
    }

    /// Remove every index document derived from one MetaStore document.
    pub async fn delete_document(&self, doc_id: i64) -> Result<()> {
        for index in [self.chunk_index.clone(), self.image_index.clone()] {
            let resp = self
                .request(
                    reqwest::Method::POST,
                    &format!("/{index}/_delete_by_query"),
                )
                .json(&json!({"query": {"term": {"doc_id": doc_id}}}))
                .send()
                .await
                .map_err(|e| Error::Transient(format!("delete_by_query failed: {e}")))?;
            if !resp.status().is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(Error::Search(format!(
                    "delete_by_query on {index}: {text}"
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Lexical (BM25) search with field boosts and optional recency decay.
    pub async fn lexical_search(
        &self,
        query: &str,
        filter: IndexFilter,
        k: usize,
        recency: Option<RecencyDecay>,
    ) -> Result<Vec<ChunkHit>> {
        let must = json!({
            "multi_match": {
                "query": query,
                "fields": [
                    format!("text^{}", self.boost_text),
                    format!("title^{}", self.boost_title),
                    format!("file_name^{}", self.boost_file_name),
                ]
            }
        });
        let body = json!({
            "size": k,
            "query": wrap_recency(bool_query(must, filter), recency),
        });
        let hits = self.search(&self.chunk_index.clone(), &body).await?;
        Ok(chunk_hits(hits, false))
    }

    /// Cosine KNN with the tenant filter applied before ranking.
    pub async fn knn_search(
        &self,
        vector: &Vector,
        filter: IndexFilter,
        k: usize,
        recency: Option<RecencyDecay>,
    ) -> Result<Vec<ChunkHit>> {
        self.check_dim(vector, self.dim)?;
        let must = json!({
            "knn": {
                "vector": {
                    "vector": vector,
                    "k": k,
                }
            }
        });
        let body = json!({
            "size": k,
            "query": wrap_recency(bool_query(must, filter), recency),
        });
        let hits = self.search(&self.chunk_index.clone(), &body).await?;
        Ok(chunk_hits(hits, true))
    }

    /// Image search: KNN when a vector is given, lexical over caption/OCR
    /// otherwise; tag terms always filter.
    pub async fn image_search(
        &self,
        query: Option<&str>,
        vector: Option<&Vector>,
        tags: &[String],
        filter: IndexFilter,
        k: usize,
    ) -> Result<Vec<ImageHit>> {
        let mut filters = filter.clauses();
        for tag in tags {
            filters.push(json!({"term": {"tags": tag}}));
        }

        let must = match (vector, query) {
            (Some(v), _) => {
                self.check_dim(v, self.image_dim)?;
                json!({"knn": {"vector": {"vector": v, "k": k}}})
            }
            (None, Some(q)) => json!({
                "multi_match": {"query": q, "fields": ["caption^2.0", "ocr_text^1.0"]}
            }),
            (None, None) => json!({"match_all": {}}),
        };

        let body = json!({
            "size": k,
            "query": {"bool": {"filter": filters, "must": [must]}},
        });
        let raw = self.search(&self.image_index.clone(), &body).await?;

        let mut scores: Vec<f32> = raw.iter().map(|h| h.score.unwrap_or(0.0)).collect();
        spaces_core::ranking::min_max(&mut scores);

        let hits = raw
            .into_iter()
            .zip(scores)
            .filter_map(|(hit, score)| {
                let src = hit.source;
                Some(ImageHit {
                    image_id: src.get("image_id")?.as_i64()?,
                    document_id: src.get("doc_id")?.as_i64()?,
                    file_path: src.get("file_path")?.as_str()?.to_string(),
                    thumbnail_path: src
                        .get("thumbnail_path")
                        .and_then(JsonValue::as_str)
                        .map(String::from),
                    caption: src
                        .get("caption")
                        .and_then(JsonValue::as_str)
                        .map(String::from),
                    tags: src
                        .get("tags")
                        .and_then(JsonValue::as_array)
                        .map(|a| {
                            a.iter()
                                .filter_map(JsonValue::as_str)
                                .map(String::from)
                                .collect()
                        })
                        .unwrap_or_default(),
                    width: src.get("width").and_then(JsonValue::as_i64).unwrap_or(0) as i32,
                    height: src.get("height").and_then(JsonValue::as_i64).unwrap_or(0) as i32,
                    score: Some(score),
                    created_at: src
                        .get("created_at")
                        .and_then(JsonValue::as_str)
                        .and_then(|s| s.parse().ok())
                        .unwrap_or_else(chrono::Utc::now),
                })
            })
            .collect();
        Ok(hits)
    }

    async fn search(&self, index: &str, body: &JsonValue) -> Result<Vec<RawHit>> {
        let start = Instant::now();
        let resp = self
            .request(reqwest::Method::POST, &format!("/{index}/_search"))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Transient(format!("search request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Search(format!("search returned {status}: {text}")));
        }

        let parsed: SearchResponse = resp.json().await.map_err(Error::from)?;
        debug!(
            subsystem = "index",
            op = "search",
            index,
            result_count = parsed.hits.hits.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Index search complete"
        );
        Ok(parsed.hits.hits)
    }

    fn check_dim(&self, vector: &[f32], expected: usize) -> Result<()> {
        if vector.len() != expected {
            return Err(Error::Validation(format!(
                "vector dimension {} does not match index dimension {expected}",
                vector.len()
            )));
        }
        Ok(())
    }
}

fn bool_query(must: JsonValue, filter: IndexFilter) -> JsonValue {
    json!({"bool": {"filter": filter.clauses(), "must": [must]}})
}

/// Wrap a query in a gaussian `created_at` decay when recency is enabled.
fn wrap_recency(query: JsonValue, recency: Option<RecencyDecay>) -> JsonValue {
    match recency {
        None => query,
        Some(r) => json!({
            "function_score": {
                "query": query,
                "functions": [{
                    "gauss": {
                        "created_at": {
                            "origin": "now",
                            "scale": format!("{}d", r.scale_days.max(1.0) as u64),
                            "decay": 0.5
                        }
                    },
                    "weight": r.weight
                }],
                "boost_mode": "sum",
                "score_mode": "sum"
            }
        }),
    }
}

/// Convert raw index hits into normalized [`ChunkHit`]s.
fn chunk_hits(raw: Vec<RawHit>, knn: bool) -> Vec<ChunkHit> {
    let mut hits: Vec<ChunkHit> = raw
        .into_iter()
        .filter_map(|hit| {
            let src = hit.source;
            let doc_id = src.get("doc_id")?.as_i64()?;
            let chunk_index = src.get("chunk_index")?.as_i64()? as i32;
            let score = hit.score.unwrap_or(0.0);
            // KNN scores are similarities in [0, 1]; map to a distance so the
            // coverage heuristics can reason about "best distance" uniformly.
            let distance = knn.then(|| 1.0 - score.clamp(0.0, 1.0));
            Some(ChunkHit {
                chunk_id: ChunkHit::synthetic_id(doc_id, chunk_index),
                document_id: doc_id,
                chunk_index,
                content: src
                    .get("text")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_string(),
                distance,
                score: Some(score),
                file_name: src
                    .get("file_name")
                    .and_then(JsonValue::as_str)
                    .map(String::from),
                source_type: src
                    .get("source_type")
                    .and_then(JsonValue::as_str)
                    .map(String::from),
            })
        })
        .collect();
    normalize_hit_scores(&mut hits);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(doc_id: i64, chunk_index: i32, score: f32) -> RawHit {
        RawHit {
            score: Some(score),
            source: json!({
                "doc_id": doc_id,
                "chunk_index": chunk_index,
                "text": "body",
                "file_name": "a.pdf",
                "source_type": "pdf",
            }),
        }
    }

    #[test]
    fn chunk_hits_normalize_scores() {
        let hits = chunk_hits(vec![raw(1, 0, 2.0), raw(1, 1, 4.0), raw(2, 0, 6.0)], false);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].score, Some(0.0));
        assert_eq!(hits[2].score, Some(1.0));
        assert!(hits.iter().all(|h| h.distance.is_none()));
    }

    #[test]
    fn knn_hits_carry_distance() {
        let hits = chunk_hits(vec![raw(1, 0, 0.9)], true);
        assert!((hits[0].distance.unwrap() - 0.1).abs() < 1e-6);
        // Single hit min-max normalizes to 1.0.
        assert_eq!(hits[0].score, Some(1.0));
    }

    #[test]
    fn malformed_hits_are_dropped() {
        let bad = RawHit {
            score: Some(1.0),
            source: json!({"text": "no ids"}),
        };
        let hits = chunk_hits(vec![bad, raw(3, 1, 0.5)], false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, 3);
        assert_eq!(hits[0].chunk_id, 3_000_001);
    }

    #[test]
    fn recency_wrap_is_identity_when_disabled() {
        let q = json!({"match_all": {}});
        assert_eq!(wrap_recency(q.clone(), None), q);
    }

    #[test]
    fn recency_wrap_builds_function_score() {
        let q = json!({"match_all": {}});
        let wrapped = wrap_recency(
            q,
            Some(RecencyDecay {
                scale_days: 30.0,
                weight: 0.25,
            }),
        );
        assert!(wrapped.get("function_score").is_some());
        assert_eq!(
            wrapped.pointer("/function_score/functions/0/gauss/created_at/scale"),
            Some(&json!("30d"))
        );
    }
}
