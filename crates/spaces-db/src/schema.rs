//! Idempotent schema initialization.
//!
//! Creates extensions, tables, and indexes if absent; safe to re-run on every
//! startup. The chunk table carries a generated `content_tsv` column using the
//! configured text search configuration and a `vector(D)` embedding column
//! sized to the text model dimension.

use sqlx::{PgPool, Row};
use tracing::info;

use spaces_core::{Error, Result, Settings};

/// Create all MetaStore tables and indexes. Idempotent.
///
/// Fails with a clear diagnostic when an existing `chunks.embedding` column
/// does not match the configured embedding dimension (the table must be
/// migrated or dropped before the dimension can change).
pub async fn init_schema(pool: &PgPool, settings: &Settings) -> Result<()> {
    let dim = settings.embedding_dim;
    let image_dim = settings.image_embedding_dim;
    let fts = validate_fts_config(&settings.fts_config)?;

    sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    let statements = vec![
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id BIGSERIAL PRIMARY KEY,
            email TEXT NOT NULL,
            pw_hash TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            last_login_at TIMESTAMPTZ
        )
        "#
        .to_string(),
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email_ci ON users (LOWER(email))".to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS spaces (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            is_default BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_spaces_user ON spaces(user_id)".to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            space_id BIGINT REFERENCES spaces(id) ON DELETE SET NULL,
            source_type TEXT NOT NULL,
            file_name TEXT NOT NULL,
            blob_url TEXT,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(user_id, space_id)"
            .to_string(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id BIGSERIAL PRIMARY KEY,
                document_id BIGINT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INT NOT NULL,
                content TEXT NOT NULL,
                content_tsv tsvector GENERATED ALWAYS AS (to_tsvector('{fts}', content)) STORED,
                char_count INT NOT NULL,
                embedding vector({dim}),
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#
        ),
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_chunks_doc_chunk ON chunks(document_id, chunk_index)"
            .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_chunks_tsv ON chunks USING GIN (content_tsv)".to_string(),
        "CREATE INDEX IF NOT EXISTS idx_chunks_embedding ON chunks USING hnsw (embedding vector_cosine_ops)"
            .to_string(),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS image_assets (
                id BIGSERIAL PRIMARY KEY,
                document_id BIGINT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                user_id BIGINT NOT NULL,
                space_id BIGINT,
                file_path TEXT NOT NULL,
                thumbnail_path TEXT,
                caption TEXT,
                ocr_text TEXT,
                tags JSONB NOT NULL DEFAULT '[]'::jsonb,
                embedding vector({image_dim}),
                native_width INT NOT NULL DEFAULT 0,
                native_height INT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#
        ),
        "CREATE INDEX IF NOT EXISTS idx_image_assets_tenant ON image_assets(user_id, space_id)"
            .to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS research_sessions (
            conversation_id TEXT PRIMARY KEY,
            user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            space_id BIGINT,
            title TEXT,
            messages JSONB NOT NULL DEFAULT '[]'::jsonb,
            notebook_entries JSONB NOT NULL DEFAULT '[]'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_research_sessions_tenant ON research_sessions(user_id, space_id)"
            .to_string(),
        r#"
        CREATE TABLE IF NOT EXISTS activity (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            kind TEXT NOT NULL,
            details JSONB NOT NULL DEFAULT '{}'::jsonb,
            ts TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_activity_user_ts ON activity(user_id, ts DESC)".to_string(),
    ];

    for sql in statements {
        sqlx::query(&sql).execute(pool).await.map_err(Error::Database)?;
    }

    verify_vector_dim(pool, "chunks", dim).await?;
    verify_vector_dim(pool, "image_assets", image_dim).await?;

    info!(
        subsystem = "db",
        component = "schema",
        op = "init",
        embedding_dim = dim,
        image_embedding_dim = image_dim,
        fts_config = fts,
        "MetaStore schema initialized"
    );
    Ok(())
}

/// Text search configuration names are interpolated into DDL; restrict to
/// identifier characters so a hostile env var cannot inject SQL.
fn validate_fts_config(name: &str) -> Result<&str> {
    if !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(name)
    } else {
        Err(Error::Config(format!(
            "invalid FTS configuration name: {name:?}"
        )))
    }
}

/// Compare the declared dimension of an existing vector column against the
/// configured one; mismatch is a startup error, not a silent corruption.
async fn verify_vector_dim(pool: &PgPool, table: &str, expected: usize) -> Result<()> {
    let row = sqlx::query(
        r#"
        SELECT atttypmod AS dim
        FROM pg_attribute
        WHERE attrelid = $1::regclass AND attname = 'embedding'
        "#,
    )
    .bind(table)
    .fetch_optional(pool)
    .await
    .map_err(Error::Database)?;

    if let Some(row) = row {
        let dim: i32 = row.get("dim");
        if dim > 0 && dim as usize != expected {
            return Err(Error::Config(format!(
                "{table}.embedding has dimension {dim} but EMBEDDING_DIM={expected}; \
                 migrate or reindex before changing the embedding model"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_config_accepts_identifiers() {
        assert!(validate_fts_config("english").is_ok());
        assert!(validate_fts_config("simple").is_ok());
        assert!(validate_fts_config("my_config1").is_ok());
    }

    #[test]
    fn fts_config_rejects_injection() {
        assert!(validate_fts_config("english', content)); DROP TABLE users; --").is_err());
        assert!(validate_fts_config("").is_err());
        assert!(validate_fts_config("a b").is_err());
    }
}
