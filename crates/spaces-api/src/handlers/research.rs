//! `/deep-research/*`: conversation lifecycle and the agentic ask loop.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use spaces_core::Tenant;
use spaces_db::research_sessions::SessionSummary;
use spaces_research::{AskRequest, ResearchOutcome};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub space_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub conversation_id: String,
}

pub async fn start(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    if let Some(space) = req.space_id {
        state.db.users.get_space(user.user_id, space).await?;
    }
    let conversation_id = state
        .agent
        .start(Tenant::new(user.user_id, req.space_id))
        .await?;
    Ok(Json(StartResponse { conversation_id }))
}

#[derive(Debug, Deserialize)]
pub struct AskBody {
    pub conversation_id: String,
    pub message: String,
    pub space_id: Option<i64>,
    pub llm_provider: Option<String>,
    #[serde(default)]
    pub force_web: bool,
    #[serde(default)]
    pub urls: Vec<String>,
}

pub async fn ask(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<AskBody>,
) -> Result<Json<ResearchOutcome>, ApiError> {
    if req.message.trim().is_empty() {
        return Err(spaces_core::Error::Validation("message required".into()).into());
    }
    let outcome = state
        .agent
        .ask(
            Tenant::new(user.user_id, req.space_id),
            AskRequest {
                conversation_id: req.conversation_id,
                message: req.message,
                force_web: req.force_web,
                urls: req.urls,
                provider_override: req.llm_provider,
            },
        )
        .await?;
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub space_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub conversations: Vec<SessionSummary>,
}

pub async fn list_conversations(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let conversations = state
        .db
        .research_sessions
        .list(
            Tenant::new(user.user_id, query.space_id),
            query.limit.clamp(1, 500),
        )
        .await?;
    Ok(Json(ListResponse { conversations }))
}
