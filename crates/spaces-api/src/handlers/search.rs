//! `/search`: semantic, fulltext, hybrid, and RAG retrieval.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use spaces_core::{defaults, ActivityKind, ChunkHit, SearchMode, Tenant};
use spaces_search::HybridOptions;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub space_id: Option<i64>,
    /// Per-request LLM provider override (RAG mode).
    pub llm_provider: Option<String>,
}

fn default_top_k() -> usize {
    defaults::SEARCH_TOP_K
}

#[derive(Debug, Serialize)]
pub struct SearchHitOut {
    pub chunk_id: i64,
    pub document_id: i64,
    pub chunk_index: i32,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReferenceOut {
    pub file_name: String,
    pub file_type: String,
    pub chunk_id: i64,
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub mode: SearchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub used_llm: bool,
    pub hits: Vec<SearchHitOut>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceOut>,
}

pub async fn search(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    if req.query.trim().is_empty() {
        return Err(spaces_core::Error::Validation("query required".into()).into());
    }
    let top_k = req.top_k.clamp(1, 100);
    let tenant = Tenant::new(user.user_id, req.space_id);

    let (hits, answer, used_llm) = match req.mode {
        SearchMode::Semantic => {
            let hits = state.retriever.semantic(&req.query, tenant, top_k).await?;
            (hits, None, false)
        }
        SearchMode::Fulltext => {
            let hits = state.retriever.lexical(&req.query, tenant, top_k).await?;
            (hits, None, false)
        }
        SearchMode::Hybrid => {
            let hits = state
                .retriever
                .hybrid(&req.query, tenant, top_k, HybridOptions::default())
                .await?;
            (hits, None, false)
        }
        SearchMode::Rag => {
            let hits = state
                .retriever
                .hybrid(&req.query, tenant, top_k, HybridOptions::default())
                .await?;
            let synthesizer = state
                .synthesizer
                .with_provider_override(req.llm_provider.as_deref(), &state.settings);
            let rag = synthesizer.synthesize(&req.query, &hits, tenant).await;
            (hits, Some(rag.answer), rag.used_llm)
        }
    };

    // Enrich hits with document metadata (file name/type/title only; never
    // the storage path).
    let doc_ids: Vec<i64> = {
        let mut ids: Vec<i64> = hits.iter().map(|h| h.document_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    };
    let docs = state.db.documents.get_many(&doc_ids, user.user_id).await?;

    let hits_out: Vec<SearchHitOut> = hits
        .iter()
        .map(|h: &ChunkHit| {
            let doc = docs.get(&h.document_id);
            SearchHitOut {
                chunk_id: h.chunk_id,
                document_id: h.document_id,
                chunk_index: h.chunk_index,
                content: h.content.clone(),
                distance: h.distance,
                score: h.score,
                file_name: doc
                    .map(|d| d.file_name.clone())
                    .or_else(|| h.file_name.clone()),
                file_type: doc
                    .map(|d| d.source_type.clone())
                    .or_else(|| h.source_type.clone()),
                title: doc.and_then(|d| {
                    d.metadata
                        .get("title")
                        .and_then(|t| t.as_str())
                        .map(String::from)
                }),
            }
        })
        .collect();

    let references = if answer.is_some() {
        hits_out
            .iter()
            .take(5)
            .map(|h| ReferenceOut {
                file_name: h.file_name.clone().unwrap_or_default(),
                file_type: h.file_type.clone().unwrap_or_default(),
                chunk_id: h.chunk_id,
                href: format!("#chunk-{}", h.chunk_id),
                url: docs.get(&h.document_id).and_then(|d| d.blob_url.clone()),
            })
            .collect()
    } else {
        Vec::new()
    };

    if let Err(e) = state
        .db
        .activity
        .record(
            user.user_id,
            ActivityKind::Search,
            json!({"mode": req.mode, "query_len": req.query.len()}),
        )
        .await
    {
        debug!(subsystem = "api", error = %e, "Activity record failed");
    }

    Ok(Json(SearchResponse {
        mode: req.mode,
        answer,
        used_llm,
        hits: hits_out,
        references,
    }))
}
