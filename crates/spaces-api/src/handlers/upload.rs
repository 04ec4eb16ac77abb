//! `/upload`: multipart file ingestion.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::warn;

use spaces_core::Tenant;
use spaces_ingest::IngestRequest;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UploadOutcome {
    pub file_name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub results: Vec<UploadOutcome>,
}

/// Accepts any number of file parts plus an optional `space_id` part.
/// One bad file fails its own entry, not the whole batch.
pub async fn upload(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut space_id: Option<i64> = None;
    let mut pending: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| spaces_core::Error::Validation(format!("malformed multipart: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("space_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| spaces_core::Error::Validation(format!("space_id: {e}")))?;
                space_id = Some(text.trim().parse().map_err(|_| {
                    spaces_core::Error::Validation(format!("invalid space_id: {text}"))
                })?);
            }
            _ => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload".to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| spaces_core::Error::Validation(format!("file read: {e}")))?;
                pending.push((file_name, data.to_vec()));
            }
        }
    }

    if pending.is_empty() {
        return Err(spaces_core::Error::Validation("no files in request".into()).into());
    }

    // Space ownership check when one was named.
    if let Some(space) = space_id {
        state.db.users.get_space(user.user_id, space).await?;
    }
    let tenant = Tenant::new(user.user_id, space_id);

    let mut results = Vec::with_capacity(pending.len());
    for (file_name, data) in pending {
        let outcome = state
            .ingestor
            .ingest(IngestRequest {
                tenant,
                user_email: user.email.clone(),
                file_name: file_name.clone(),
                data,
            })
            .await;

        match outcome {
            Ok(result) => results.push(UploadOutcome {
                file_name: result.file_name,
                status: "ok",
                document_id: Some(result.document_id),
                num_chunks: Some(result.num_chunks),
                blob_url: result.blob_url,
                error: None,
            }),
            Err(e) => {
                warn!(
                    subsystem = "api",
                    component = "upload",
                    file_name = %file_name,
                    error = %e,
                    "File ingestion failed"
                );
                results.push(UploadOutcome {
                    file_name,
                    status: "error",
                    document_id: None,
                    num_chunks: None,
                    blob_url: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    Ok(Json(UploadResponse { results }))
}
