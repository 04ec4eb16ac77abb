//! Index document and query types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spaces_core::{Tenant, Vector};

/// One chunk document as stored in the chunk index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub doc_id: i64,
    pub chunk_index: i32,
    pub text: String,
    pub title: String,
    pub file_name: String,
    pub source_type: String,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vector>,
}

impl IndexedChunk {
    /// Stable index `_id`; re-indexing the same chunk overwrites in place.
    pub fn index_id(&self) -> String {
        format!("{}#{}", self.doc_id, self.chunk_index)
    }
}

/// One image document as stored in the image index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedImage {
    pub image_id: i64,
    pub doc_id: i64,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_text: Option<String>,
    pub tags: Vec<String>,
    pub user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub space_id: Option<i64>,
    pub width: i32,
    pub height: i32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vector>,
}

impl IndexedImage {
    pub fn index_id(&self) -> String {
        format!("img-{}", self.image_id)
    }
}

/// Tenant filter applied before ranking on every query.
#[derive(Debug, Clone, Copy)]
pub struct IndexFilter {
    pub user_id: i64,
    pub space_id: Option<i64>,
}

impl From<Tenant> for IndexFilter {
    fn from(t: Tenant) -> Self {
        Self {
            user_id: t.user_id,
            space_id: t.space_id,
        }
    }
}

impl IndexFilter {
    /// Build the bool-query filter clauses.
    pub(crate) fn clauses(&self) -> Vec<serde_json::Value> {
        let mut filters = vec![serde_json::json!({"term": {"user_id": self.user_id}})];
        if let Some(space) = self.space_id {
            filters.push(serde_json::json!({"term": {"space_id": space}}));
        }
        filters
    }
}

/// Gaussian `created_at` decay parameters.
#[derive(Debug, Clone, Copy)]
pub struct RecencyDecay {
    pub scale_days: f64,
    pub weight: f64,
}

/// Outcome of a bulk indexing call. Partial failure is reported, never
/// partially applied within a single document's batch of chunks.
#[derive(Debug, Clone, Default)]
pub struct BulkReport {
    pub indexed: usize,
    pub failed: Vec<String>,
}

impl BulkReport {
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_index_id_is_stable() {
        let chunk = IndexedChunk {
            doc_id: 42,
            chunk_index: 3,
            text: String::new(),
            title: String::new(),
            file_name: String::new(),
            source_type: "pdf".into(),
            user_id: 1,
            space_id: None,
            created_at: Utc::now(),
            vector: None,
        };
        assert_eq!(chunk.index_id(), "42#3");
    }

    #[test]
    fn filter_clauses_include_space_when_present() {
        let f = IndexFilter {
            user_id: 7,
            space_id: Some(42),
        };
        assert_eq!(f.clauses().len(), 2);
        let f = IndexFilter {
            user_id: 7,
            space_id: None,
        };
        assert_eq!(f.clauses().len(), 1);
    }
}
