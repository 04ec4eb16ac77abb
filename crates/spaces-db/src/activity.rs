//! Activity log repository.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};

use spaces_core::{Activity, ActivityKind, Error, Result};

/// PostgreSQL repository for the activity audit trail.
#[derive(Clone)]
pub struct PgActivityRepository {
    pool: PgPool,
}

impl PgActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record one activity. Best-effort callers may ignore the error.
    pub async fn record(
        &self,
        user_id: i64,
        kind: ActivityKind,
        details: JsonValue,
    ) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO activity (user_id, kind, details) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(details)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.get("id"))
    }

    /// Most recent activity for a user.
    pub async fn list_recent(&self, user_id: i64, limit: i64) -> Result<Vec<Activity>> {
        let rows = sqlx::query(
            "SELECT id, user_id, kind, details, ts
             FROM activity WHERE user_id = $1
             ORDER BY ts DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let items = rows
            .into_iter()
            .filter_map(|row| {
                let kind = match row.get::<String, _>("kind").as_str() {
                    "upload" => ActivityKind::Upload,
                    "search" => ActivityKind::Search,
                    "deep_research" => ActivityKind::DeepResearch,
                    "delete_doc" => ActivityKind::DeleteDoc,
                    _ => return None,
                };
                Some(Activity {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    kind,
                    details: row.get("details"),
                    ts: row.get::<DateTime<Utc>, _>("ts"),
                })
            })
            .collect();
        Ok(items)
    }
}
