//! Core data model shared across SpacesAI crates.
//!
//! The relational MetaStore is authoritative for all of these entities;
//! search-index documents and cache payloads are derived projections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// Embedding vector. Always unit-normalized before storage or KNN.
pub type Vector = Vec<f32>;

// =============================================================================
// TENANCY
// =============================================================================

/// The `(user_id, space_id)` pair that scopes every read and write.
///
/// A `None` space means "all spaces owned by the user".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tenant {
    pub user_id: i64,
    pub space_id: Option<i64>,
}

impl Tenant {
    pub fn new(user_id: i64, space_id: Option<i64>) -> Self {
        Self { user_id, space_id }
    }

    /// Cache-key fragment, e.g. `7:42` or `7:_`.
    pub fn key_fragment(&self) -> String {
        match self.space_id {
            Some(s) => format!("{}:{}", self.user_id, s),
            None => format!("{}:_", self.user_id),
        }
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

/// Registered account. Created by the auth gateway; the core only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default, skip_serializing)]
    pub pw_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Named collection of documents owned by one user.
/// Every user has at least one space; exactly one is the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Space {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Uploaded source document. `metadata` is an open key-value map; well-known
/// keys: `image_caption`, `image_caption_source`, `image_ocr_text`,
/// `thumbnail_url`, `storage_backend`. Unknown keys are preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub user_id: i64,
    pub space_id: Option<i64>,
    pub source_type: String,
    pub file_name: String,
    pub blob_url: Option<String>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Contiguous slice of normalized document text.
/// `(document_id, chunk_index)` is the stable key; indexes are 0-based and
/// gap-free per document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i32,
    pub content: String,
    pub char_count: i32,
    /// Present only when `persist_embeddings_in_metastore` is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vector>,
    pub created_at: DateTime<Utc>,
}

/// Image extracted or uploaded alongside a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAsset {
    pub id: i64,
    pub document_id: i64,
    pub user_id: i64,
    pub space_id: Option<i64>,
    pub file_path: String,
    pub thumbnail_path: Option<String>,
    pub caption: Option<String>,
    pub ocr_text: Option<String>,
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vector>,
    pub native_width: i32,
    pub native_height: i32,
    pub created_at: DateTime<Utc>,
}

/// Where a caption came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionSource {
    /// Large vision model answered within its timeout.
    Primary,
    /// Small model (or heuristic) answered after the primary failed/timed out.
    Fallback,
}

// =============================================================================
// RESEARCH SESSIONS
// =============================================================================

/// Evidence source for a returned reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefSource {
    Local,
    Web,
    Url,
}

/// A citation attached to a Deep Research answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub source: RefSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub rank: usize,
}

/// One turn in a research conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchMessage {
    /// `user` | `assistant` | `system`
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<f64>,
    #[serde(default)]
    pub web_attempted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub followup_questions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ResearchMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            references: Vec::new(),
            confidence: None,
            elapsed_seconds: None,
            web_attempted: false,
            followup_questions: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Stateful Deep Research conversation. `messages` is append-only and
/// trimmed to the most recent [`crate::defaults::RESEARCH_MESSAGE_RETENTION`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    pub conversation_id: String,
    pub user_id: i64,
    pub space_id: Option<i64>,
    pub title: Option<String>,
    pub messages: Vec<ResearchMessage>,
    #[serde(default)]
    pub notebook_entries: Vec<NotebookEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A note the user pinned from a research answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotebookEntry {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub source: JsonValue,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// ACTIVITY
// =============================================================================

/// Recorded user activity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Upload,
    Search,
    DeepResearch,
    DeleteDoc,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Upload => "upload",
            ActivityKind::Search => "search",
            ActivityKind::DeepResearch => "deep_research",
            ActivityKind::DeleteDoc => "delete_doc",
        }
    }
}

/// Audit-trail record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    pub user_id: i64,
    pub kind: ActivityKind,
    pub details: JsonValue,
    pub ts: DateTime<Utc>,
}

// =============================================================================
// SEARCH RESULTS
// =============================================================================

/// One retrieved chunk. `score` is min-max normalized per call so values are
/// comparable across backends; `distance` is the raw cosine distance when the
/// hit came from a KNN query (lower is better).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHit {
    pub chunk_id: i64,
    pub document_id: i64,
    pub chunk_index: i32,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

impl ChunkHit {
    /// Stable synthetic id for hits coming from the search index, which does
    /// not know MetaStore chunk ids. Collision-free while documents stay
    /// under a million chunks.
    pub fn synthetic_id(document_id: i64, chunk_index: i32) -> i64 {
        document_id * 1_000_000 + chunk_index as i64
    }

    /// Key identifying the underlying chunk regardless of backend.
    pub fn dedupe_key(&self) -> (i64, i32) {
        (self.document_id, self.chunk_index)
    }
}

/// One retrieved image asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageHit {
    pub image_id: i64,
    pub document_id: i64,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub tags: Vec<String>,
    pub width: i32,
    pub height: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    pub created_at: DateTime<Utc>,
}

/// Retrieval mode for `/search`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Semantic,
    Fulltext,
    #[default]
    Hybrid,
    Rag,
}

impl std::str::FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "semantic" => Ok(SearchMode::Semantic),
            "fulltext" => Ok(SearchMode::Fulltext),
            "hybrid" => Ok(SearchMode::Hybrid),
            "rag" => Ok(SearchMode::Rag),
            other => Err(Error::Validation(format!("unknown search mode: {other}"))),
        }
    }
}

/// Which store serves retrieval queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    #[default]
    SearchIndex,
    MetaStore,
}

impl std::str::FromStr for SearchBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "searchindex" | "opensearch" => Ok(SearchBackend::SearchIndex),
            "metastore" | "pgvector" => Ok(SearchBackend::MetaStore),
            other => Err(Error::Config(format!("unknown search backend: {other}"))),
        }
    }
}

impl SearchBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchBackend::SearchIndex => "searchindex",
            SearchBackend::MetaStore => "metastore",
        }
    }
}

// =============================================================================
// EXTRACTION & INGESTION
// =============================================================================

/// Declared/detected file type; drives extraction dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Html,
    Docx,
    Pptx,
    Xlsx,
    Csv,
    Json,
    Md,
    Txt,
    Image,
    Audio,
    Video,
}

impl SourceType {
    /// Detect from a file name extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(SourceType::Pdf),
            "html" | "htm" => Some(SourceType::Html),
            "docx" => Some(SourceType::Docx),
            "pptx" => Some(SourceType::Pptx),
            "xlsx" | "xls" => Some(SourceType::Xlsx),
            "csv" => Some(SourceType::Csv),
            "json" => Some(SourceType::Json),
            "md" | "markdown" => Some(SourceType::Md),
            "txt" | "text" | "log" => Some(SourceType::Txt),
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "tif" | "tiff" => Some(SourceType::Image),
            "mp3" | "wav" | "m4a" | "flac" | "ogg" => Some(SourceType::Audio),
            "mp4" | "mov" | "mkv" | "webm" | "avi" => Some(SourceType::Video),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Pdf => "pdf",
            SourceType::Html => "html",
            SourceType::Docx => "docx",
            SourceType::Pptx => "pptx",
            SourceType::Xlsx => "xlsx",
            SourceType::Csv => "csv",
            SourceType::Json => "json",
            SourceType::Md => "md",
            SourceType::Txt => "txt",
            SourceType::Image => "image",
            SourceType::Audio => "audio",
            SourceType::Video => "video",
        }
    }

    /// Audio/video are rejected by this core (transcription is out of scope).
    pub fn is_supported(&self) -> bool {
        !matches!(self, SourceType::Audio | SourceType::Video)
    }
}

/// Image-specific extraction output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageExtraction {
    pub ocr_text: String,
    pub caption: Option<String>,
    pub caption_source: Option<CaptionSource>,
    pub tags: Vec<String>,
    pub width: u32,
    pub height: u32,
    pub thumbnail_path: Option<String>,
}

/// Output of content extraction for one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    /// Normalized text (paragraph boundaries preserved).
    pub text: String,
    /// Present when the source is an image.
    pub image: Option<ImageExtraction>,
    /// Format-specific metadata (page counts, sheet names, titles).
    pub metadata: JsonValue,
}

/// Result of ingesting one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResult {
    pub document_id: i64,
    pub num_chunks: usize,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
}

// =============================================================================
// WEB SEARCH
// =============================================================================

/// One web search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_key_fragment() {
        assert_eq!(Tenant::new(7, Some(42)).key_fragment(), "7:42");
        assert_eq!(Tenant::new(7, None).key_fragment(), "7:_");
    }

    #[test]
    fn search_mode_parses() {
        assert_eq!("HYBRID".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);
        assert_eq!("rag".parse::<SearchMode>().unwrap(), SearchMode::Rag);
        assert!("vibes".parse::<SearchMode>().is_err());
    }

    #[test]
    fn search_backend_parses_aliases() {
        assert_eq!(
            "opensearch".parse::<SearchBackend>().unwrap(),
            SearchBackend::SearchIndex
        );
        assert_eq!(
            "pgvector".parse::<SearchBackend>().unwrap(),
            SearchBackend::MetaStore
        );
    }

    #[test]
    fn source_type_detection() {
        assert_eq!(
            SourceType::from_file_name("report.PDF"),
            Some(SourceType::Pdf)
        );
        assert_eq!(
            SourceType::from_file_name("deck.pptx"),
            Some(SourceType::Pptx)
        );
        assert_eq!(SourceType::from_file_name("noext"), None);
    }

    #[test]
    fn audio_video_unsupported() {
        assert!(!SourceType::Audio.is_supported());
        assert!(!SourceType::Video.is_supported());
        assert!(SourceType::Pdf.is_supported());
    }

    #[test]
    fn synthetic_chunk_id_roundtrip() {
        let id = ChunkHit::synthetic_id(42, 3);
        assert_eq!(id, 42_000_003);
        assert_eq!(id / 1_000_000, 42);
        assert_eq!((id % 1_000_000) as i32, 3);
    }

    #[test]
    fn chunk_hit_dedupe_key() {
        let hit = ChunkHit {
            chunk_id: 1,
            document_id: 9,
            chunk_index: 2,
            content: "x".into(),
            distance: None,
            score: None,
            file_name: None,
            source_type: None,
        };
        assert_eq!(hit.dedupe_key(), (9, 2));
    }

    #[test]
    fn research_message_roundtrip() {
        let mut msg = ResearchMessage::new("assistant", "answer");
        msg.confidence = Some(0.72);
        msg.web_attempted = true;
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ResearchMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.role, "assistant");
        assert_eq!(parsed.confidence, Some(0.72));
        assert!(parsed.web_attempted);
    }

    #[test]
    fn caption_source_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&CaptionSource::Fallback).unwrap(),
            "\"fallback\""
        );
    }
}
