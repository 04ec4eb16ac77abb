//! `/image-search`: caption/OCR/tag and vector retrieval over image assets.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use spaces_core::{defaults, ImageHit, Tenant, Vector};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ImageSearchRequest {
    pub query: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub space_id: Option<i64>,
    /// Pre-computed image-model query vector (e.g. search-by-image).
    pub vector: Option<Vector>,
}

fn default_top_k() -> usize {
    defaults::SEARCH_TOP_K
}

#[derive(Debug, Serialize)]
pub struct ImageSearchResponse {
    pub count: usize,
    pub results: Vec<ImageHit>,
}

pub async fn image_search(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ImageSearchRequest>,
) -> Result<Json<ImageSearchResponse>, ApiError> {
    if req.query.is_none() && req.vector.is_none() && req.tags.is_empty() {
        return Err(
            spaces_core::Error::Validation("query, vector, or tags required".into()).into(),
        );
    }
    if let Some(vector) = &req.vector {
        if vector.len() != state.settings.image_embedding_dim {
            return Err(spaces_core::Error::Validation(format!(
                "vector dimension {} does not match image model dimension {}",
                vector.len(),
                state.settings.image_embedding_dim
            ))
            .into());
        }
    }

    let tenant = Tenant::new(user.user_id, req.space_id);
    let results = state
        .retriever
        .image_search(
            req.query.as_deref(),
            req.vector.as_ref(),
            &req.tags,
            tenant,
            req.top_k.clamp(1, 100),
        )
        .await?;

    Ok(Json(ImageSearchResponse {
        count: results.len(),
        results,
    }))
}
