//! `/health` and `/ready` probes.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value as JsonValue};
use sqlx::Row;

use crate::AppState;

pub async fn health() -> Json<JsonValue> {
    Json(json!({"status": "ok"}))
}

/// Readiness: schema present, pgvector installed, cache state reported.
pub async fn ready(State(state): State<AppState>) -> Json<JsonValue> {
    let mut checks = json!({
        "extension": false,
        "documents_table": false,
        "chunks_table": false,
        "cache_enabled": state.cache.is_enabled(),
        "index_configured": state.reindexer.is_some(),
    });

    let pool = &state.db.pool;
    if let Ok(row) =
        sqlx::query("SELECT EXISTS(SELECT 1 FROM pg_extension WHERE extname = 'vector') AS ok")
            .fetch_one(pool)
            .await
    {
        checks["extension"] = json!(row.get::<bool, _>("ok"));
    }
    for (table, key) in [("documents", "documents_table"), ("chunks", "chunks_table")] {
        if let Ok(row) = sqlx::query("SELECT to_regclass($1) IS NOT NULL AS ok")
            .bind(table)
            .fetch_one(pool)
            .await
        {
            checks[key] = json!(row.get::<bool, _>("ok"));
        }
    }

    let ready = checks["extension"].as_bool().unwrap_or(false)
        && checks["documents_table"].as_bool().unwrap_or(false)
        && checks["chunks_table"].as_bool().unwrap_or(false);

    Json(json!({"ready": ready, "checks": checks}))
}
