//! Research session persistence.
//!
//! One row per conversation; `messages` and `notebook_entries` live in JSONB.
//! Updates are last-writer-wins; a session has a single owner, so row-level
//! transactions are sufficient (no cross-call locking).

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::debug;

use spaces_core::defaults::RESEARCH_MESSAGE_RETENTION;
use spaces_core::{
    Error, NotebookEntry, ResearchMessage, ResearchSession, Result, Tenant,
};

/// Summary row for conversation listings.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionSummary {
    pub conversation_id: String,
    pub title: Option<String>,
    pub space_id: Option<i64>,
    pub message_count: usize,
    pub first_question: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// PostgreSQL repository for research sessions.
#[derive(Clone)]
pub struct PgResearchSessionRepository {
    pool: PgPool,
}

impl PgResearchSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the conversation row if missing; keeps the earliest title.
    pub async fn ensure(
        &self,
        conversation_id: &str,
        tenant: Tenant,
        title: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO research_sessions (conversation_id, user_id, space_id, title)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (conversation_id) DO UPDATE
              SET space_id = COALESCE(EXCLUDED.space_id, research_sessions.space_id),
                  title = COALESCE(research_sessions.title, EXCLUDED.title),
                  updated_at = now()
            "#,
        )
        .bind(conversation_id)
        .bind(tenant.user_id)
        .bind(tenant.space_id)
        .bind(title)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Load a session, enforcing ownership. Messages beyond the retention
    /// window are dropped on load.
    pub async fn load(&self, conversation_id: &str, user_id: i64) -> Result<ResearchSession> {
        let row = sqlx::query(
            r#"
            SELECT conversation_id, user_id, space_id, title, messages, notebook_entries,
                   created_at, updated_at
            FROM research_sessions
            WHERE conversation_id = $1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("conversation {conversation_id}")))?;

        let owner: i64 = row.get("user_id");
        if owner != user_id {
            return Err(Error::Forbidden(format!("conversation {conversation_id}")));
        }

        let mut messages: Vec<ResearchMessage> =
            serde_json::from_value(row.get::<JsonValue, _>("messages")).unwrap_or_default();
        if messages.len() > RESEARCH_MESSAGE_RETENTION {
            messages = messages.split_off(messages.len() - RESEARCH_MESSAGE_RETENTION);
        }
        let notebook_entries: Vec<NotebookEntry> =
            serde_json::from_value(row.get::<JsonValue, _>("notebook_entries"))
                .unwrap_or_default();

        Ok(ResearchSession {
            conversation_id: row.get("conversation_id"),
            user_id: owner,
            space_id: row.get("space_id"),
            title: row.get("title"),
            messages,
            notebook_entries,
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        })
    }

    /// Persist the message list (already trimmed by the caller) and bump
    /// `updated_at`. Last-writer-wins by design.
    pub async fn save_messages(
        &self,
        conversation_id: &str,
        user_id: i64,
        messages: &[ResearchMessage],
    ) -> Result<()> {
        let trimmed: &[ResearchMessage] = if messages.len() > RESEARCH_MESSAGE_RETENTION {
            &messages[messages.len() - RESEARCH_MESSAGE_RETENTION..]
        } else {
            messages
        };

        let result = sqlx::query(
            r#"
            UPDATE research_sessions
            SET messages = $3, updated_at = now()
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(serde_json::to_value(trimmed)?)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("conversation {conversation_id}")));
        }
        debug!(
            subsystem = "db",
            component = "research_sessions",
            op = "save_messages",
            conversation_id,
            result_count = trimmed.len(),
            "Session messages persisted"
        );
        Ok(())
    }

    pub async fn set_title(&self, conversation_id: &str, user_id: i64, title: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE research_sessions SET title = $3, updated_at = now()
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(title)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("conversation {conversation_id}")));
        }
        Ok(())
    }

    /// List a tenant's conversations, most recently updated first.
    pub async fn list(&self, tenant: Tenant, limit: i64) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT conversation_id, title, space_id, messages, created_at, updated_at
            FROM research_sessions
            WHERE user_id = $1 AND ($2::bigint IS NULL OR space_id = $2)
            ORDER BY updated_at DESC
            LIMIT $3
            "#,
        )
        .bind(tenant.user_id)
        .bind(tenant.space_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let summaries = rows
            .into_iter()
            .map(|row| {
                let messages: Vec<ResearchMessage> =
                    serde_json::from_value(row.get::<JsonValue, _>("messages"))
                        .unwrap_or_default();
                let first_question = messages
                    .iter()
                    .find(|m| m.role == "user")
                    .map(|m| m.content.clone());
                SessionSummary {
                    conversation_id: row.get("conversation_id"),
                    title: row.get("title"),
                    space_id: row.get("space_id"),
                    message_count: messages.len(),
                    first_question,
                    created_at: row.get::<DateTime<Utc>, _>("created_at"),
                    updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
                }
            })
            .collect();
        Ok(summaries)
    }
}
