//! Image asset repository.

use chrono::{DateTime, Utc};
use pgvector::Vector as PgVector;
use sqlx::{PgPool, Row};

use spaces_core::{Error, ImageAsset, Result, Tenant};

/// PostgreSQL repository for image assets.
#[derive(Clone)]
pub struct PgImageAssetRepository {
    pool: PgPool,
}

impl PgImageAssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, image_id: i64, tenant: Tenant) -> Result<ImageAsset> {
        let row = sqlx::query(
            r#"
            SELECT id, document_id, user_id, space_id, file_path, thumbnail_path,
                   caption, ocr_text, tags, embedding, native_width, native_height, created_at
            FROM image_assets
            WHERE id = $1 AND user_id = $2 AND ($3::bigint IS NULL OR space_id = $3)
            "#,
        )
        .bind(image_id)
        .bind(tenant.user_id)
        .bind(tenant.space_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("image asset {image_id}")))?;

        Ok(row_to_asset(&row))
    }

    /// Image assets of one document in insertion order (reindex path).
    pub async fn list_for_document(&self, document_id: i64) -> Result<Vec<ImageAsset>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, user_id, space_id, file_path, thumbnail_path,
                   caption, ocr_text, tags, embedding, native_width, native_height, created_at
            FROM image_assets
            WHERE document_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(row_to_asset).collect())
    }
}

fn row_to_asset(row: &sqlx::postgres::PgRow) -> ImageAsset {
    let tags: Vec<String> =
        serde_json::from_value(row.get::<serde_json::Value, _>("tags")).unwrap_or_default();
    ImageAsset {
        id: row.get("id"),
        document_id: row.get("document_id"),
        user_id: row.get("user_id"),
        space_id: row.get("space_id"),
        file_path: row.get("file_path"),
        thumbnail_path: row.get("thumbnail_path"),
        caption: row.get("caption"),
        ocr_text: row.get("ocr_text"),
        tags,
        embedding: row
            .get::<Option<PgVector>, _>("embedding")
            .map(|v| v.to_vec()),
        native_width: row.get("native_width"),
        native_height: row.get("native_height"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    }
}
