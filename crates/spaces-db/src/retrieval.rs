//! Retrieval over the relational store: the `metastore` backend.
//!
//! Serves the same contracts as the search index adapter: tenant-filtered
//! cosine KNN over `chunks.embedding` and full-text ranking over the
//! generated `content_tsv` column with a file-name boost, both with an
//! optional gaussian recency wrapper. Scores are min-max normalized per call.

use pgvector::Vector as PgVector;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

use spaces_core::ranking::normalize_hit_scores;
use spaces_core::{ChunkHit, Error, ImageHit, Result, Tenant, Vector};

/// Optional gaussian recency decay applied inside the ranking expression.
#[derive(Debug, Clone, Copy)]
pub struct RecencyParams {
    pub scale_days: f64,
    pub weight: f64,
}

/// Retrieval queries against the MetaStore.
#[derive(Clone)]
pub struct PgRetrieval {
    pool: PgPool,
}

impl PgRetrieval {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Cosine KNN over persisted chunk embeddings.
    ///
    /// Returns an empty list (with a warning) when embeddings are not
    /// persisted in the MetaStore; the caller should be using the search
    /// index backend in that configuration.
    pub async fn semantic_search(
        &self,
        query_vec: &Vector,
        tenant: Tenant,
        top_k: usize,
        recency: Option<RecencyParams>,
    ) -> Result<Vec<ChunkHit>> {
        let vec = PgVector::from(query_vec.clone());

        let order = match recency {
            None => "c.embedding <=> $1::vector ASC".to_string(),
            Some(r) => format!(
                "(1.0 - (c.embedding <=> $1::vector)) + {w} * exp(-power(extract(epoch from (now() - d.created_at)) / 86400.0 / {s}, 2) / 2.0) DESC",
                w = r.weight,
                s = r.scale_days.max(1.0),
            ),
        };

        let sql = format!(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.content,
                   d.file_name, d.source_type,
                   (c.embedding <=> $1::vector) AS distance
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE c.embedding IS NOT NULL
              AND d.user_id = $2
              AND ($3::bigint IS NULL OR d.space_id = $3)
            ORDER BY {order}
            LIMIT $4
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(&vec)
            .bind(tenant.user_id)
            .bind(tenant.space_id)
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        if rows.is_empty() {
            debug!(
                subsystem = "db",
                component = "retrieval",
                op = "semantic",
                user_id = tenant.user_id,
                "No semantic hits (embeddings may not be persisted in the MetaStore)"
            );
        }

        let mut hits: Vec<ChunkHit> = rows
            .into_iter()
            .map(|row| {
                let distance: f64 = row.get("distance");
                ChunkHit {
                    chunk_id: row.get("id"),
                    document_id: row.get("document_id"),
                    chunk_index: row.get("chunk_index"),
                    content: row.get("content"),
                    distance: Some(distance as f32),
                    score: Some(1.0 - distance as f32),
                    file_name: row.get("file_name"),
                    source_type: row.get("source_type"),
                }
            })
            .collect();
        normalize_hit_scores(&mut hits);
        Ok(hits)
    }

    /// Full-text ranking over chunk content with a file-name boost
    /// (setweight 'A' on the file name, 'C' on body text).
    pub async fn lexical_search(
        &self,
        query: &str,
        tenant: Tenant,
        top_k: usize,
        fts_config: &str,
        recency: Option<RecencyParams>,
    ) -> Result<Vec<ChunkHit>> {
        let rank_expr = r#"
            ts_rank_cd(
                setweight(to_tsvector($1::regconfig, COALESCE(d.file_name, '')), 'A') || c.content_tsv,
                plainto_tsquery($1::regconfig, $2)
            )"#;

        let order = match recency {
            None => "rank DESC".to_string(),
            Some(r) => format!(
                "rank + {w} * exp(-power(extract(epoch from (now() - d.created_at)) / 86400.0 / {s}, 2) / 2.0) DESC",
                w = r.weight,
                s = r.scale_days.max(1.0),
            ),
        };

        let sql = format!(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.content,
                   d.file_name, d.source_type,
                   {rank_expr} AS rank
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE (c.content_tsv @@ plainto_tsquery($1::regconfig, $2)
                   OR to_tsvector($1::regconfig, COALESCE(d.file_name, '')) @@ plainto_tsquery($1::regconfig, $2))
              AND d.user_id = $3
              AND ($4::bigint IS NULL OR d.space_id = $4)
            ORDER BY {order}
            LIMIT $5
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(fts_config)
            .bind(query)
            .bind(tenant.user_id)
            .bind(tenant.space_id)
            .bind(top_k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut hits: Vec<ChunkHit> = rows
            .into_iter()
            .map(|row| ChunkHit {
                chunk_id: row.get("id"),
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
                distance: None,
                score: Some(row.get::<f32, _>("rank")),
                file_name: row.get("file_name"),
                source_type: row.get("source_type"),
            })
            .collect();
        normalize_hit_scores(&mut hits);
        Ok(hits)
    }

    /// Image search fallback: vector KNN when a query vector is present,
    /// caption/OCR ILIKE otherwise; tag containment always filters. An empty
    /// tag list compares equal to `'[]'` so the placeholder is always bound.
    pub async fn image_search(
        &self,
        query: Option<&str>,
        query_vec: Option<&Vector>,
        tags: &[String],
        tenant: Tenant,
        top_k: usize,
    ) -> Result<Vec<ImageHit>> {
        const SELECT: &str = r#"
            SELECT ia.id, ia.document_id, ia.file_path, ia.thumbnail_path, ia.caption,
                   ia.tags, ia.native_width, ia.native_height, ia.created_at,
        "#;
        const TENANT_AND_TAGS: &str = r#"
            FROM image_assets ia
            WHERE ia.user_id = $1
              AND ($2::bigint IS NULL OR ia.space_id = $2)
              AND ($3::jsonb = '[]'::jsonb OR ia.tags @> $3::jsonb)
        "#;

        let tags_json = serde_json::to_value(tags)?;
        let rows = match (query_vec, query) {
            (Some(vector), _) => {
                let sql = format!(
                    r#"{SELECT} (1.0 - (ia.embedding <=> $4::vector))::float4 AS score
                       {TENANT_AND_TAGS}
                       AND ia.embedding IS NOT NULL
                       ORDER BY ia.embedding <=> $4::vector ASC
                       LIMIT $5"#
                );
                sqlx::query(&sql)
                    .bind(tenant.user_id)
                    .bind(tenant.space_id)
                    .bind(tags_json)
                    .bind(PgVector::from(vector.clone()))
                    .bind(top_k as i64)
                    .fetch_all(&self.pool)
                    .await
            }
            (None, Some(text)) => {
                let sql = format!(
                    r#"{SELECT} 0.0::float4 AS score
                       {TENANT_AND_TAGS}
                       AND (ia.caption ILIKE '%' || $4 || '%'
                            OR COALESCE(ia.ocr_text, '') ILIKE '%' || $4 || '%')
                       ORDER BY ia.created_at DESC
                       LIMIT $5"#
                );
                sqlx::query(&sql)
                    .bind(tenant.user_id)
                    .bind(tenant.space_id)
                    .bind(tags_json)
                    .bind(text)
                    .bind(top_k as i64)
                    .fetch_all(&self.pool)
                    .await
            }
            (None, None) => {
                let sql = format!(
                    r#"{SELECT} 0.0::float4 AS score
                       {TENANT_AND_TAGS}
                       ORDER BY ia.created_at DESC
                       LIMIT $4"#
                );
                sqlx::query(&sql)
                    .bind(tenant.user_id)
                    .bind(tenant.space_id)
                    .bind(tags_json)
                    .bind(top_k as i64)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(Error::Database)?;

        let hits = rows
            .into_iter()
            .map(|row| {
                let tags: Vec<String> =
                    serde_json::from_value(row.get::<serde_json::Value, _>("tags"))
                        .unwrap_or_else(|e| {
                            warn!(error = %e, "Malformed image tags payload");
                            Vec::new()
                        });
                ImageHit {
                    image_id: row.get("id"),
                    document_id: row.get("document_id"),
                    file_path: row.get("file_path"),
                    thumbnail_path: row.get("thumbnail_path"),
                    caption: row.get("caption"),
                    tags,
                    width: row.get("native_width"),
                    height: row.get("native_height"),
                    score: Some(row.get::<f32, _>("score")),
                    created_at: row.get("created_at"),
                }
            })
            .collect();
        Ok(hits)
    }
}
