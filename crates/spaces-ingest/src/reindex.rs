//! Rebuild search-index entries from the MetaStore.
//!
//! The recovery tool for failed dual-writes and the migration tool for
//! mapping changes: index state is always derivable from the relational
//! store. Chunks without persisted embeddings are re-embedded on the fly.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use spaces_core::{EmbeddingBackend, Result, Tenant};
use spaces_db::Database;
use spaces_index::{IndexedChunk, IndexedImage, SearchIndexClient};

/// What to reindex.
#[derive(Debug, Clone, Copy)]
pub enum ReindexScope {
    Document(i64),
    Space(i64),
    All,
}

/// Rebuilds index entries for a tenant's documents.
pub struct Reindexer {
    db: Database,
    index: SearchIndexClient,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl Reindexer {
    pub fn new(db: Database, index: SearchIndexClient, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            db,
            index,
            embedder,
        }
    }

    /// Reindex the scoped documents; returns how many documents converged.
    pub async fn reindex(&self, user_id: i64, scope: ReindexScope) -> Result<usize> {
        let (doc_id, space_id) = match scope {
            ReindexScope::Document(id) => (Some(id), None),
            ReindexScope::Space(id) => (None, Some(id)),
            ReindexScope::All => (None, None),
        };
        let ids = self
            .db
            .documents
            .ids_for_reindex(user_id, doc_id, space_id)
            .await?;

        let mut reindexed = 0usize;
        for id in ids {
            match self.reindex_document(user_id, id).await {
                Ok(()) => reindexed += 1,
                Err(e) => {
                    // One bad document must not block the rest of the sweep.
                    warn!(
                        subsystem = "ingest",
                        component = "reindex",
                        document_id = id,
                        error = %e,
                        "Document reindex failed"
                    );
                }
            }
        }

        info!(
            subsystem = "ingest",
            component = "reindex",
            op = "reindex",
            user_id,
            result_count = reindexed,
            "Reindex complete"
        );
        Ok(reindexed)
    }

    async fn reindex_document(&self, user_id: i64, document_id: i64) -> Result<()> {
        let doc = self
            .db
            .documents
            .get(document_id, Tenant::new(user_id, None))
            .await?;
        let chunks = self.db.documents.list_chunks(document_id).await?;

        // Re-embed anything the MetaStore does not hold a vector for.
        let missing: Vec<String> = chunks
            .iter()
            .filter(|c| c.embedding.is_none())
            .map(|c| c.content.clone())
            .collect();
        let mut fresh = if missing.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_texts(&missing).await?
        }
        .into_iter();

        let title = Path::new(&doc.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| doc.file_name.clone());

        let docs: Vec<IndexedChunk> = chunks
            .iter()
            .map(|chunk| IndexedChunk {
                doc_id: document_id,
                chunk_index: chunk.chunk_index,
                text: chunk.content.clone(),
                title: title.clone(),
                file_name: doc.file_name.clone(),
                source_type: doc.source_type.clone(),
                user_id: doc.user_id,
                space_id: doc.space_id,
                created_at: doc.created_at,
                vector: chunk.embedding.clone().or_else(|| fresh.next()),
            })
            .collect();
        self.index.bulk_index_chunks(&docs).await?;

        let images = self.db.image_assets.list_for_document(document_id).await?;
        if !images.is_empty() {
            let image_docs: Vec<IndexedImage> = images
                .into_iter()
                .map(|img| IndexedImage {
                    image_id: img.id,
                    doc_id: document_id,
                    file_path: img.file_path,
                    thumbnail_path: img.thumbnail_path,
                    caption: img.caption,
                    ocr_text: img.ocr_text,
                    tags: img.tags,
                    user_id: img.user_id,
                    space_id: img.space_id,
                    width: img.native_width,
                    height: img.native_height,
                    created_at: img.created_at,
                    vector: img.embedding,
                })
                .collect();
            self.index.bulk_index_images(&image_docs).await?;
        }
        Ok(())
    }
}
