//! Document and chunk repository.
//!
//! Ingestion writes a document, its ordered chunks, and any image assets in
//! a single transaction: external observers see either no chunks or all of
//! them. Deletes cascade to chunks and image assets at the schema level.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pgvector::Vector as PgVector;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use spaces_core::{Chunk, Document, Error, Result, Tenant, Vector};

/// New document payload for ingestion.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub user_id: i64,
    pub space_id: Option<i64>,
    pub source_type: String,
    pub file_name: String,
    pub blob_url: Option<String>,
    pub metadata: JsonValue,
}

/// One chunk to insert; `chunk_index` must be contiguous from 0.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk_index: i32,
    pub content: String,
    pub char_count: i32,
    /// Persisted only when `persist_embeddings_in_metastore` is on.
    pub embedding: Option<Vector>,
}

/// One image asset to insert alongside the document.
#[derive(Debug, Clone)]
pub struct NewImageAsset {
    pub file_path: String,
    pub thumbnail_path: Option<String>,
    pub caption: Option<String>,
    pub ocr_text: Option<String>,
    pub tags: Vec<String>,
    pub embedding: Option<Vector>,
    pub native_width: i32,
    pub native_height: i32,
}

/// PostgreSQL repository for documents and chunks.
#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a document, its chunks (ascending `chunk_index`), and image
    /// assets in one transaction. Returns `(document_id, image_asset_ids)`.
    pub async fn create_with_chunks(
        &self,
        doc: &NewDocument,
        chunks: &[NewChunk],
        images: &[NewImageAsset],
    ) -> Result<(i64, Vec<i64>)> {
        debug_assert!(chunks
            .iter()
            .enumerate()
            .all(|(i, c)| c.chunk_index == i as i32));

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            r#"
            INSERT INTO documents (user_id, space_id, source_type, file_name, blob_url, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(doc.user_id)
        .bind(doc.space_id)
        .bind(&doc.source_type)
        .bind(&doc.file_name)
        .bind(&doc.blob_url)
        .bind(&doc.metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;
        let document_id: i64 = row.get("id");

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (document_id, chunk_index, content, char_count, embedding)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(chunk.char_count)
            .bind(chunk.embedding.as_ref().map(|v| PgVector::from(v.clone())))
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        let mut image_ids = Vec::with_capacity(images.len());
        for image in images {
            let row = sqlx::query(
                r#"
                INSERT INTO image_assets
                    (document_id, user_id, space_id, file_path, thumbnail_path,
                     caption, ocr_text, tags, embedding, native_width, native_height)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                RETURNING id
                "#,
            )
            .bind(document_id)
            .bind(doc.user_id)
            .bind(doc.space_id)
            .bind(&image.file_path)
            .bind(&image.thumbnail_path)
            .bind(&image.caption)
            .bind(&image.ocr_text)
            .bind(serde_json::to_value(&image.tags)?)
            .bind(image.embedding.as_ref().map(|v| PgVector::from(v.clone())))
            .bind(image.native_width)
            .bind(image.native_height)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;
            image_ids.push(row.get("id"));
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "documents",
            op = "create",
            document_id,
            user_id = doc.user_id,
            chunk_count = chunks.len(),
            image_count = images.len(),
            "Document persisted"
        );
        Ok((document_id, image_ids))
    }

    /// Fetch a document, enforcing tenancy: another tenant's document is
    /// indistinguishable from a missing one.
    pub async fn get(&self, document_id: i64, tenant: Tenant) -> Result<Document> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, space_id, source_type, file_name, blob_url, metadata, created_at
            FROM documents
            WHERE id = $1 AND user_id = $2 AND ($3::bigint IS NULL OR space_id = $3)
            "#,
        )
        .bind(document_id)
        .bind(tenant.user_id)
        .bind(tenant.space_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("document {document_id}")))?;

        Ok(row_to_document(&row))
    }

    /// List documents for a tenant, newest first, with the total count.
    pub async fn list(
        &self,
        tenant: Tenant,
        limit: i64,
        offset: i64,
    ) -> Result<(i64, Vec<Document>)> {
        let total: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM documents
             WHERE user_id = $1 AND ($2::bigint IS NULL OR space_id = $2)",
        )
        .bind(tenant.user_id)
        .bind(tenant.space_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?
        .get("n");

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, space_id, source_type, file_name, blob_url, metadata, created_at
            FROM documents
            WHERE user_id = $1 AND ($2::bigint IS NULL OR space_id = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(tenant.user_id)
        .bind(tenant.space_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok((total, rows.iter().map(row_to_document).collect()))
    }

    /// Batch metadata lookup for hit enrichment, scoped to the caller.
    pub async fn get_many(
        &self,
        document_ids: &[i64],
        user_id: i64,
    ) -> Result<HashMap<i64, Document>> {
        if document_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, space_id, source_type, file_name, blob_url, metadata, created_at
            FROM documents
            WHERE id = ANY($1) AND user_id = $2
            "#,
        )
        .bind(document_ids)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .iter()
            .map(|r| {
                let d = row_to_document(r);
                (d.id, d)
            })
            .collect())
    }

    /// Delete a document (chunks and image assets cascade). Returns the
    /// deleted document so callers can clean up derived stores.
    pub async fn delete(&self, document_id: i64, tenant: Tenant) -> Result<Document> {
        let doc = self.get(document_id, tenant).await?;
        sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "documents",
            op = "delete",
            document_id,
            user_id = tenant.user_id,
            "Document deleted"
        );
        Ok(doc)
    }

    /// Merge keys into a document's metadata map.
    pub async fn merge_metadata(&self, document_id: i64, patch: &JsonValue) -> Result<()> {
        sqlx::query("UPDATE documents SET metadata = metadata || $2 WHERE id = $1")
            .bind(document_id)
            .bind(patch)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    pub async fn chunk_count(&self, document_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chunks WHERE document_id = $1")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("n"))
    }

    /// All chunks of a document in index order (reindex and previews).
    pub async fn list_chunks(&self, document_id: i64) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, chunk_index, content, char_count, embedding, created_at
            FROM chunks
            WHERE document_id = $1
            ORDER BY chunk_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let chunks = rows
            .into_iter()
            .map(|row| Chunk {
                id: row.get("id"),
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
                char_count: row.get("char_count"),
                embedding: row
                    .get::<Option<PgVector>, _>("embedding")
                    .map(|v| v.to_vec()),
                created_at: row.get::<DateTime<Utc>, _>("created_at"),
            })
            .collect();
        Ok(chunks)
    }

    /// Document ids to reindex: one document, one space, or everything a
    /// user owns.
    pub async fn ids_for_reindex(
        &self,
        user_id: i64,
        document_id: Option<i64>,
        space_id: Option<i64>,
    ) -> Result<Vec<i64>> {
        let rows = match (document_id, space_id) {
            (Some(doc), _) => {
                sqlx::query("SELECT id FROM documents WHERE id = $1 AND user_id = $2")
                    .bind(doc)
                    .bind(user_id)
                    .fetch_all(&self.pool)
                    .await
            }
            (None, Some(space)) => {
                sqlx::query("SELECT id FROM documents WHERE user_id = $1 AND space_id = $2")
                    .bind(user_id)
                    .bind(space)
                    .fetch_all(&self.pool)
                    .await
            }
            (None, None) => sqlx::query("SELECT id FROM documents WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "documents",
            op = "ids_for_reindex",
            user_id,
            result_count = rows.len(),
            "Resolved reindex scope"
        );
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    /// Rehydrate chunk content for cached hit ids. Tenancy is enforced so a
    /// poisoned cache entry cannot leak another tenant's text.
    pub async fn get_chunks_by_keys(
        &self,
        keys: &[(i64, i32)],
        user_id: i64,
    ) -> Result<HashMap<(i64, i32), (String, String, String)>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let doc_ids: Vec<i64> = keys.iter().map(|(d, _)| *d).collect();
        let chunk_indexes: Vec<i32> = keys.iter().map(|(_, c)| *c).collect();

        let rows = sqlx::query(
            r#"
            SELECT c.document_id, c.chunk_index, c.content, d.file_name, d.source_type
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            JOIN UNNEST($1::bigint[], $2::int[]) AS want(doc_id, chunk_index)
              ON want.doc_id = c.document_id AND want.chunk_index = c.chunk_index
            WHERE d.user_id = $3
            "#,
        )
        .bind(&doc_ids)
        .bind(&chunk_indexes)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    (
                        row.get::<i64, _>("document_id"),
                        row.get::<i32, _>("chunk_index"),
                    ),
                    (
                        row.get::<String, _>("content"),
                        row.get::<String, _>("file_name"),
                        row.get::<String, _>("source_type"),
                    ),
                )
            })
            .collect())
    }

    /// `created_at` per document, used by the recency re-ranker.
    pub async fn created_at_map(
        &self,
        document_ids: &[i64],
    ) -> Result<HashMap<i64, DateTime<Utc>>> {
        if document_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query("SELECT id, created_at FROM documents WHERE id = ANY($1)")
            .bind(document_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<i64, _>("id"), r.get::<DateTime<Utc>, _>("created_at")))
            .collect())
    }
}

fn row_to_document(row: &sqlx::postgres::PgRow) -> Document {
    Document {
        id: row.get("id"),
        user_id: row.get("user_id"),
        space_id: row.get("space_id"),
        source_type: row.get("source_type"),
        file_name: row.get("file_name"),
        blob_url: row.get("blob_url"),
        metadata: row.get("metadata"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    }
}
