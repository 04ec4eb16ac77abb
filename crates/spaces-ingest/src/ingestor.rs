//! The per-file ingestion pipeline.
//!
//! Order per file: blob persist → extract → chunk → embed → single
//! MetaStore transaction → best-effort index dual-write → cache revision
//! bump → activity record. Only the MetaStore write is atomic; the index
//! write may lag or fail (recovered by `reindex`), and a failed bump only
//! delays cache convergence until TTL expiry.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use spaces_cache::{CacheKind, RevisionedCache};
use spaces_core::{
    ActivityKind, BlobStore, ChunkParams, EmbeddingBackend, Error, ImageEmbeddingBackend,
    IngestResult, RecursiveChunker, Result, Settings, Tenant, Vector,
};
use spaces_db::{Database, NewChunk, NewDocument, NewImageAsset};
use spaces_index::{IndexedChunk, IndexedImage, SearchIndexClient};

use crate::blob::blob_key;
use crate::extract::ExtractionRegistry;
use crate::retry::with_default_backoff;

/// One upload to ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub tenant: Tenant,
    pub user_email: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Orchestrates the ingestion pipeline. One instance serves many concurrent
/// requests; each request is internally sequential.
pub struct Ingestor {
    db: Database,
    cache: RevisionedCache,
    index: Option<SearchIndexClient>,
    blob: Arc<dyn BlobStore>,
    embedder: Arc<dyn EmbeddingBackend>,
    image_embedder: Option<Arc<dyn ImageEmbeddingBackend>>,
    registry: ExtractionRegistry,
    chunker: RecursiveChunker,
    settings: Settings,
}

impl Ingestor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        cache: RevisionedCache,
        index: Option<SearchIndexClient>,
        blob: Arc<dyn BlobStore>,
        embedder: Arc<dyn EmbeddingBackend>,
        image_embedder: Option<Arc<dyn ImageEmbeddingBackend>>,
        registry: ExtractionRegistry,
        settings: Settings,
    ) -> Self {
        let chunker = RecursiveChunker::new(ChunkParams::new(
            settings.chunk_size,
            settings.chunk_overlap,
        ));
        Self {
            db,
            cache,
            index,
            blob,
            embedder,
            image_embedder,
            registry,
            chunker,
            settings,
        }
    }

    /// Ingest one uploaded file.
    pub async fn ingest(&self, req: IngestRequest) -> Result<IngestResult> {
        let start = Instant::now();

        if req.data.is_empty() {
            return Err(Error::Validation("empty upload".into()));
        }
        if req.data.len() as u64 > self.settings.max_upload_bytes() {
            return Err(Error::Validation(format!(
                "file exceeds {} MB limit",
                self.settings.max_upload_size_mb
            )));
        }

        // 1. Persist the original binary.
        let key = blob_key(&req.user_email, &req.file_name);
        let blob_url = with_default_backoff("blob_put", || self.blob.put(&key, &req.data))
            .await
            .map(Some)
            .unwrap_or_else(|e| {
                // The MetaStore copy of extracted text is authoritative; a
                // lost original is reported but not fatal.
                warn!(
                    subsystem = "ingest",
                    component = "ingestor",
                    file_name = %req.file_name,
                    error = %e,
                    "Blob persist failed; continuing without blob URL"
                );
                None
            });

        // 2. Extract normalized content.
        let (extraction, source_type) = self.registry.extract(&req.data, &req.file_name).await?;
        if extraction.text.trim().is_empty() {
            return Err(Error::Validation(
                "no textual content extracted from file".into(),
            ));
        }

        // 3. Chunk and embed.
        let chunks = self.chunker.chunk(&extraction.text);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings =
            with_default_backoff("embed_chunks", || self.embedder.embed_texts(&texts)).await?;
        if embeddings.len() != chunks.len() {
            return Err(Error::Internal(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let image_embedding = match (&extraction.image, &self.image_embedder) {
            (Some(_), Some(embedder)) => {
                match with_default_backoff("embed_image", || {
                    embedder.embed_images(std::slice::from_ref(&req.data))
                })
                .await
                {
                    Ok(mut vecs) => vecs.pop(),
                    Err(e) => {
                        warn!(
                            subsystem = "ingest",
                            component = "ingestor",
                            error = %e,
                            "Image embedding failed; asset stored without vector"
                        );
                        None
                    }
                }
            }
            _ => None,
        };

        // 4. One MetaStore transaction for document + chunks + image assets.
        let mut metadata = json!({
            "filename": req.file_name.clone(),
            "storage_backend": "local",
        });
        merge_json(&mut metadata, &extraction.metadata);
        if let Some(img) = &extraction.image {
            metadata["image_ocr_text"] = json!(img.ocr_text);
            if let Some(caption) = &img.caption {
                metadata["image_caption"] = json!(caption);
            }
            if let Some(source) = img.caption_source {
                metadata["image_caption_source"] = serde_json::to_value(source)?;
            }
            if let Some(thumb) = &img.thumbnail_path {
                metadata["thumbnail_url"] = json!(thumb);
            }
        }

        let persist_vectors = self.settings.persist_embeddings_in_metastore;
        let new_chunks: Vec<NewChunk> = chunks
            .iter()
            .zip(&embeddings)
            .enumerate()
            .map(|(i, (chunk, vector))| NewChunk {
                chunk_index: i as i32,
                content: chunk.text.clone(),
                char_count: chunk.char_count() as i32,
                embedding: persist_vectors.then(|| vector.clone()),
            })
            .collect();

        let new_images: Vec<NewImageAsset> = extraction
            .image
            .iter()
            .map(|img| NewImageAsset {
                file_path: key.clone(),
                thumbnail_path: img.thumbnail_path.clone(),
                caption: img.caption.clone(),
                ocr_text: (!img.ocr_text.is_empty()).then(|| img.ocr_text.clone()),
                tags: img.tags.clone(),
                embedding: image_embedding.clone(),
                native_width: img.width as i32,
                native_height: img.height as i32,
            })
            .collect();

        let doc = NewDocument {
            user_id: req.tenant.user_id,
            space_id: req.tenant.space_id,
            source_type: source_type.as_str().to_string(),
            file_name: req.file_name.clone(),
            blob_url: blob_url.clone(),
            metadata,
        };
        let (document_id, image_ids) = self
            .db
            .documents
            .create_with_chunks(&doc, &new_chunks, &new_images)
            .await?;

        // 5. Best-effort dual-write to the search index.
        if let Some(index) = &self.index {
            if self.settings.index_dual_write {
                self.dual_write(
                    index,
                    &req,
                    document_id,
                    &image_ids,
                    &new_chunks,
                    &embeddings,
                    &new_images,
                    source_type.as_str(),
                )
                .await;
            }
        }

        // 6. Invalidate cached retrievals for this tenant.
        self.cache.bump(req.tenant, CacheKind::Text).await;
        if !new_images.is_empty() {
            self.cache.bump(req.tenant, CacheKind::Image).await;
        }

        // 7. Activity trail (best-effort).
        if let Err(e) = self
            .db
            .activity
            .record(
                req.tenant.user_id,
                ActivityKind::Upload,
                json!({
                    "document_id": document_id,
                    "file_name": req.file_name.clone(),
                    "num_chunks": new_chunks.len(),
                }),
            )
            .await
        {
            warn!(
                subsystem = "ingest",
                component = "ingestor",
                error = %e,
                "Activity record failed"
            );
        }

        info!(
            subsystem = "ingest",
            component = "ingestor",
            op = "ingest",
            document_id,
            user_id = req.tenant.user_id,
            file_name = %req.file_name,
            chunk_count = new_chunks.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "File ingested"
        );

        Ok(IngestResult {
            document_id,
            num_chunks: new_chunks.len(),
            file_name: req.file_name,
            blob_url,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn dual_write(
        &self,
        index: &SearchIndexClient,
        req: &IngestRequest,
        document_id: i64,
        image_ids: &[i64],
        chunks: &[NewChunk],
        embeddings: &[Vector],
        images: &[NewImageAsset],
        source_type: &str,
    ) {
        let now = Utc::now();
        let title = Path::new(&req.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| req.file_name.clone());

        let docs: Vec<IndexedChunk> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| IndexedChunk {
                doc_id: document_id,
                chunk_index: chunk.chunk_index,
                text: chunk.content.clone(),
                title: title.clone(),
                file_name: req.file_name.clone(),
                source_type: source_type.to_string(),
                user_id: req.tenant.user_id,
                space_id: req.tenant.space_id,
                created_at: now,
                vector: Some(vector.clone()),
            })
            .collect();

        match index.bulk_index_chunks(&docs).await {
            Ok(report) if !report.all_ok() => warn!(
                subsystem = "ingest",
                component = "ingestor",
                document_id,
                failed = report.failed.len(),
                "Index dual-write partially failed; reindex will converge"
            ),
            Ok(_) => {}
            Err(e) => warn!(
                subsystem = "ingest",
                component = "ingestor",
                document_id,
                error = %e,
                "Index dual-write failed; reindex will converge"
            ),
        }

        if images.is_empty() {
            return;
        }
        let image_docs: Vec<IndexedImage> = images
            .iter()
            .zip(image_ids)
            .map(|(img, id)| IndexedImage {
                image_id: *id,
                doc_id: document_id,
                file_path: img.file_path.clone(),
                thumbnail_path: img.thumbnail_path.clone(),
                caption: img.caption.clone(),
                ocr_text: img.ocr_text.clone(),
                tags: img.tags.clone(),
                user_id: req.tenant.user_id,
                space_id: req.tenant.space_id,
                width: img.native_width,
                height: img.native_height,
                created_at: now,
                vector: img.embedding.clone(),
            })
            .collect();

        if let Err(e) = index.bulk_index_images(&image_docs).await {
            warn!(
                subsystem = "ingest",
                component = "ingestor",
                document_id,
                error = %e,
                "Image index dual-write failed; reindex will converge"
            );
        }
    }

    /// Delete a document everywhere: MetaStore (authoritative, cascading),
    /// then best-effort index cleanup, then cache invalidation.
    pub async fn delete_document(&self, document_id: i64, tenant: Tenant) -> Result<()> {
        self.db.documents.delete(document_id, tenant).await?;

        if let Some(index) = &self.index {
            if let Err(e) = index.delete_document(document_id).await {
                warn!(
                    subsystem = "ingest",
                    component = "ingestor",
                    document_id,
                    error = %e,
                    "Index delete failed; reindex will converge"
                );
            }
        }

        self.cache.bump(tenant, CacheKind::Text).await;
        self.cache.bump(tenant, CacheKind::Image).await;

        if let Err(e) = self
            .db
            .activity
            .record(
                tenant.user_id,
                ActivityKind::DeleteDoc,
                json!({"document_id": document_id}),
            )
            .await
        {
            warn!(subsystem = "ingest", error = %e, "Activity record failed");
        }
        Ok(())
    }
}

/// Shallow-merge `patch` object keys into `target`.
fn merge_json(target: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (Some(target_map), Some(patch_map)) = (target.as_object_mut(), patch.as_object()) {
        for (k, v) in patch_map {
            target_map.insert(k.clone(), v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_json_overlays_keys() {
        let mut target = json!({"a": 1, "b": 2});
        merge_json(&mut target, &json!({"b": 3, "c": 4}));
        assert_eq!(target, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn merge_json_ignores_non_objects() {
        let mut target = json!({"a": 1});
        merge_json(&mut target, &serde_json::Value::Null);
        assert_eq!(target, json!({"a": 1}));
    }
}
