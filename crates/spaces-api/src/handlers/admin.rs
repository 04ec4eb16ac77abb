//! `/admin/*`: document listing/deletion and reindexing.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use spaces_core::{Document, Tenant};
use spaces_ingest::ReindexScope;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    pub space_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct DocumentOut {
    pub id: i64,
    pub space_id: Option<i64>,
    pub source_type: String,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub chunk_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ListDocumentsResponse {
    pub total: i64,
    pub documents: Vec<DocumentOut>,
}

pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<ListDocumentsResponse>, ApiError> {
    let tenant = Tenant::new(user.user_id, query.space_id);
    let (total, documents) = state
        .db
        .documents
        .list(tenant, query.limit.clamp(1, 500), query.offset.max(0))
        .await?;

    let mut out = Vec::with_capacity(documents.len());
    for doc in documents {
        let chunk_count = state.db.documents.chunk_count(doc.id).await?;
        out.push(document_out(doc, chunk_count));
    }
    Ok(Json(ListDocumentsResponse {
        total,
        documents: out,
    }))
}

fn document_out(doc: Document, chunk_count: i64) -> DocumentOut {
    DocumentOut {
        id: doc.id,
        space_id: doc.space_id,
        source_type: doc.source_type,
        file_name: doc.file_name,
        blob_url: doc.blob_url,
        metadata: doc.metadata,
        created_at: doc.created_at,
        chunk_count,
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
    pub deleted_id: i64,
}

pub async fn delete_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(document_id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state
        .ingestor
        .delete_document(document_id, Tenant::new(user.user_id, None))
        .await?;
    Ok(Json(DeleteResponse {
        ok: true,
        deleted_id: document_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ReindexRequest {
    pub doc_id: Option<i64>,
    pub space_id: Option<i64>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct ReindexResponse {
    pub ok: bool,
    pub reindexed: usize,
}

pub async fn reindex(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ReindexRequest>,
) -> Result<Json<ReindexResponse>, ApiError> {
    let Some(reindexer) = &state.reindexer else {
        return Err(spaces_core::Error::Config(
            "no search index configured; nothing to reindex".into(),
        )
        .into());
    };

    let scope = match (req.doc_id, req.space_id, req.all) {
        (Some(doc), _, _) => ReindexScope::Document(doc),
        (None, Some(space), _) => ReindexScope::Space(space),
        (None, None, true) => ReindexScope::All,
        (None, None, false) => {
            return Err(spaces_core::Error::Validation(
                "one of doc_id, space_id, or all:true is required".into(),
            )
            .into())
        }
    };

    let reindexed = reindexer.reindex(user.user_id, scope).await?;
    Ok(Json(ReindexResponse {
        ok: true,
        reindexed,
    }))
}
