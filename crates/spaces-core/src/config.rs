//! Environment-driven service configuration.
//!
//! Read once at startup with [`Settings::from_env`]; every recognized option
//! has a documented default in [`crate::defaults`]. Unset variables fall back
//! to defaults; malformed numeric values are ignored with the same effect.

use std::time::Duration;

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::SearchBackend;

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Service configuration. Cheap to clone; shared via `Arc` in practice.
#[derive(Debug, Clone)]
pub struct Settings {
    // Server
    pub host: String,
    pub port: u16,
    pub app_name: String,

    // Storage
    pub data_dir: String,
    pub upload_dir: String,
    pub max_upload_size_mb: u64,
    pub delete_uploaded_after_ingest: bool,
    pub spool_threshold_bytes: usize,

    // Chunking
    pub chunk_size: usize,
    pub chunk_overlap: usize,

    // Database
    pub database_url: Option<String>,
    pub db_pool_max: u32,
    pub fts_config: String,

    // Embeddings
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub embedding_batch_size: usize,
    pub image_embed_model: String,
    pub image_embedding_dim: usize,
    pub persist_embeddings_in_metastore: bool,

    // Retrieval backend
    pub search_backend: SearchBackend,
    pub index_dual_write: bool,

    // Search index (OpenSearch-compatible)
    pub index_host: Option<String>,
    pub index_user: Option<String>,
    pub index_password: Option<String>,
    pub chunk_index: String,
    pub image_index: String,
    pub index_timeout_secs: u64,
    pub index_shards: u32,
    pub index_replicas: u32,

    // Cache (Valkey/Redis)
    pub valkey_url: Option<String>,
    pub cache_ttl_semantic_secs: u64,
    pub cache_ttl_llm_secs: u64,
    pub cache_failure_threshold: u32,
    pub cache_cooldown_secs: u64,
    pub cache_schema_version: String,

    // Ranking
    pub boost_text: f32,
    pub boost_title: f32,
    pub boost_file_name: f32,
    pub recency_enable: bool,
    pub recency_scale_days: f64,
    pub recency_weight: f64,
    pub hybrid_mmr_enable: bool,
    pub hybrid_mmr_lambda: f32,

    // LLM
    pub llm_provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub ollama_host: String,
    pub ollama_model: String,
    pub caption_model: Option<String>,
    pub caption_model_small: Option<String>,
    pub caption_timeout_secs: u64,

    // Web search
    pub web_provider: String,
    pub serpapi_key: Option<String>,
    pub bing_key: Option<String>,

    // Deep Research
    pub research_budget_secs: u64,
    pub research_top_k_local: usize,
    pub research_top_k_web: usize,
    pub research_retry_loops: u32,
    pub research_missing_loops: u32,
    pub research_missing_top_k: usize,
    pub research_confidence_threshold: f32,
    pub research_confidence_baseline: f32,
    pub research_web_timeout_secs: u64,
    pub research_followup_autosend: bool,
    pub research_followup_relevance_min: f32,
    pub research_followup_max: usize,
    pub coverage_min_hits: usize,
    pub coverage_min_docs: usize,
    pub coverage_max_distance: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            app_name: "SpacesAI".to_string(),
            data_dir: "storage".to_string(),
            upload_dir: "storage/uploads".to_string(),
            max_upload_size_mb: defaults::MAX_UPLOAD_SIZE_MB,
            delete_uploaded_after_ingest: false,
            spool_threshold_bytes: defaults::UPLOAD_SPOOL_THRESHOLD_BYTES,
            chunk_size: defaults::CHUNK_SIZE,
            chunk_overlap: defaults::CHUNK_OVERLAP,
            database_url: None,
            db_pool_max: defaults::DB_POOL_MAX,
            fts_config: "english".to_string(),
            embedding_model: defaults::EMBED_MODEL.to_string(),
            embedding_dim: defaults::EMBED_DIMENSION,
            embedding_batch_size: defaults::EMBED_BATCH_SIZE,
            image_embed_model: defaults::IMAGE_EMBED_MODEL.to_string(),
            image_embedding_dim: defaults::IMAGE_EMBED_DIMENSION,
            persist_embeddings_in_metastore: false,
            search_backend: SearchBackend::SearchIndex,
            index_dual_write: true,
            index_host: None,
            index_user: None,
            index_password: None,
            chunk_index: defaults::CHUNK_INDEX.to_string(),
            image_index: defaults::IMAGE_INDEX.to_string(),
            index_timeout_secs: defaults::INDEX_TIMEOUT_SECS,
            index_shards: defaults::INDEX_SHARDS,
            index_replicas: defaults::INDEX_REPLICAS,
            valkey_url: None,
            cache_ttl_semantic_secs: defaults::CACHE_TTL_SEMANTIC_SECS,
            cache_ttl_llm_secs: defaults::CACHE_TTL_LLM_SECS,
            cache_failure_threshold: defaults::CACHE_FAILURE_THRESHOLD,
            cache_cooldown_secs: defaults::CACHE_COOLDOWN_SECS,
            cache_schema_version: defaults::CACHE_SCHEMA_VERSION.to_string(),
            boost_text: defaults::BOOST_TEXT,
            boost_title: defaults::BOOST_TITLE,
            boost_file_name: defaults::BOOST_FILE_NAME,
            recency_enable: false,
            recency_scale_days: defaults::RECENCY_SCALE_DAYS,
            recency_weight: defaults::RECENCY_WEIGHT,
            hybrid_mmr_enable: false,
            hybrid_mmr_lambda: defaults::MMR_LAMBDA,
            llm_provider: "none".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            ollama_host: defaults::OLLAMA_URL.to_string(),
            ollama_model: defaults::GEN_MODEL.to_string(),
            caption_model: None,
            caption_model_small: None,
            caption_timeout_secs: defaults::CAPTION_TIMEOUT_SECS,
            web_provider: "none".to_string(),
            serpapi_key: None,
            bing_key: None,
            research_budget_secs: defaults::RESEARCH_BUDGET_SECS,
            research_top_k_local: defaults::RESEARCH_TOP_K_LOCAL,
            research_top_k_web: defaults::RESEARCH_TOP_K_WEB,
            research_retry_loops: defaults::RESEARCH_RETRY_LOOPS,
            research_missing_loops: defaults::RESEARCH_MISSING_LOOPS,
            research_missing_top_k: defaults::RESEARCH_MISSING_TOP_K,
            research_confidence_threshold: defaults::RESEARCH_CONFIDENCE_THRESHOLD,
            research_confidence_baseline: defaults::RESEARCH_CONFIDENCE_BASELINE,
            research_web_timeout_secs: defaults::RESEARCH_WEB_TIMEOUT_SECS,
            research_followup_autosend: true,
            research_followup_relevance_min: defaults::RESEARCH_FOLLOWUP_RELEVANCE_MIN,
            research_followup_max: defaults::RESEARCH_FOLLOWUP_MAX,
            coverage_min_hits: defaults::COVERAGE_MIN_HITS,
            coverage_min_docs: defaults::COVERAGE_MIN_DOCS,
            coverage_max_distance: defaults::COVERAGE_MAX_DISTANCE,
        }
    }
}

impl Settings {
    /// Build settings from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Settings::default();
        Self {
            host: env_str("HOST", &d.host),
            port: env_parse("PORT", d.port),
            app_name: env_str("APP_NAME", &d.app_name),
            data_dir: env_str("DATA_DIR", &d.data_dir),
            upload_dir: env_str("UPLOAD_DIR", &d.upload_dir),
            max_upload_size_mb: env_parse("MAX_UPLOAD_SIZE_MB", d.max_upload_size_mb),
            delete_uploaded_after_ingest: env_bool("DELETE_UPLOADED_FILES", false),
            spool_threshold_bytes: env_parse("UPLOAD_SPOOL_THRESHOLD", d.spool_threshold_bytes),
            chunk_size: env_parse("CHUNK_SIZE", d.chunk_size),
            chunk_overlap: env_parse("CHUNK_OVERLAP", d.chunk_overlap),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max: env_parse("DB_POOL_MAX_SIZE", d.db_pool_max),
            fts_config: env_str("FTS_CONFIG", &d.fts_config),
            embedding_model: env_str("EMBEDDING_MODEL", &d.embedding_model),
            embedding_dim: env_parse("EMBEDDING_DIM", d.embedding_dim),
            embedding_batch_size: env_parse("EMBEDDING_BATCH", d.embedding_batch_size),
            image_embed_model: env_str("IMAGE_EMBED_MODEL", &d.image_embed_model),
            image_embedding_dim: env_parse("IMAGE_EMBEDDING_DIM", d.image_embedding_dim),
            persist_embeddings_in_metastore: env_bool("DB_STORE_EMBEDDINGS", false),
            search_backend: env_str("SEARCH_BACKEND", "searchindex")
                .parse()
                .unwrap_or_default(),
            index_dual_write: env_bool("INDEX_DUAL_WRITE", true),
            index_host: env_opt("SEARCHINDEX_HOST").or_else(|| env_opt("OPENSEARCH_HOST")),
            index_user: env_opt("SEARCHINDEX_USER"),
            index_password: env_opt("SEARCHINDEX_PASSWORD"),
            chunk_index: env_str("CHUNK_INDEX", &d.chunk_index),
            image_index: env_str("IMAGE_INDEX", &d.image_index),
            index_timeout_secs: env_parse("SEARCHINDEX_TIMEOUT", d.index_timeout_secs),
            index_shards: env_parse("SEARCHINDEX_SHARDS", d.index_shards),
            index_replicas: env_parse("SEARCHINDEX_REPLICAS", d.index_replicas),
            valkey_url: env_opt("VALKEY_URL").or_else(|| env_opt("REDIS_URL")),
            cache_ttl_semantic_secs: env_parse("CACHE_TTL_SECONDS", d.cache_ttl_semantic_secs),
            cache_ttl_llm_secs: env_parse("LLM_CACHE_TTL_SECONDS", d.cache_ttl_llm_secs),
            cache_failure_threshold: env_parse(
                "CACHE_FAILURE_THRESHOLD",
                d.cache_failure_threshold,
            ),
            cache_cooldown_secs: env_parse("CACHE_COOLDOWN_SECONDS", d.cache_cooldown_secs),
            cache_schema_version: env_str("CACHE_SCHEMA_VERSION", &d.cache_schema_version),
            boost_text: env_parse("BM25_BOOST_TEXT", d.boost_text),
            boost_title: env_parse("BM25_BOOST_TITLE", d.boost_title),
            boost_file_name: env_parse("BM25_BOOST_FILE_NAME", d.boost_file_name),
            recency_enable: env_bool("RECENCY_BOOST", false),
            recency_scale_days: env_parse("RECENCY_SCALE_DAYS", d.recency_scale_days),
            recency_weight: env_parse("RECENCY_WEIGHT", d.recency_weight),
            hybrid_mmr_enable: env_bool("HYBRID_MMR_ENABLE", false),
            hybrid_mmr_lambda: env_parse("HYBRID_MMR_LAMBDA", d.hybrid_mmr_lambda),
            llm_provider: env_str("LLM_PROVIDER", &d.llm_provider).to_ascii_lowercase(),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_model: env_str("OPENAI_MODEL", &d.openai_model),
            ollama_host: env_str("OLLAMA_HOST", &d.ollama_host),
            ollama_model: env_str("OLLAMA_MODEL", &d.ollama_model),
            caption_model: env_opt("IMAGE_CAPTION_MODEL"),
            caption_model_small: env_opt("IMAGE_CAPTION_MODEL_SMALL"),
            caption_timeout_secs: env_parse("IMAGE_CAPTION_TIMEOUT", d.caption_timeout_secs),
            web_provider: env_str("WEB_SEARCH_PROVIDER", &d.web_provider).to_ascii_lowercase(),
            serpapi_key: env_opt("SERPAPI_KEY"),
            bing_key: env_opt("BING_SEARCH_KEY"),
            research_budget_secs: env_parse("DR_TIMEOUT_SECONDS", d.research_budget_secs),
            research_top_k_local: env_parse("DR_LOCAL_TOP_K", d.research_top_k_local),
            research_top_k_web: env_parse("DR_WEB_TOP_K", d.research_top_k_web),
            research_retry_loops: env_parse("DR_RETRY_LOOPS", d.research_retry_loops),
            research_missing_loops: env_parse(
                "DR_MISSING_CONCEPT_LOOPS",
                d.research_missing_loops,
            ),
            research_missing_top_k: env_parse(
                "DR_MISSING_CONCEPT_TOP_K",
                d.research_missing_top_k,
            ),
            research_confidence_threshold: env_parse(
                "DR_CONFIDENCE_THRESHOLD",
                d.research_confidence_threshold,
            ),
            research_confidence_baseline: env_parse(
                "DR_CONFIDENCE_BASELINE",
                d.research_confidence_baseline,
            ),
            research_web_timeout_secs: env_parse("DR_WEB_TIMEOUT", d.research_web_timeout_secs),
            research_followup_autosend: env_bool("DR_FOLLOWUP_AUTOSEND", true),
            research_followup_relevance_min: env_parse(
                "DR_FOLLOWUP_RELEVANCE_MIN",
                d.research_followup_relevance_min,
            ),
            research_followup_max: env_parse("DR_FOLLOWUP_MAX_QUESTIONS", d.research_followup_max),
            coverage_min_hits: env_parse("DR_COVERAGE_MIN_HITS", d.coverage_min_hits),
            coverage_min_docs: env_parse("DR_COVERAGE_MIN_DOCS", d.coverage_min_docs),
            coverage_max_distance: env_parse("DR_COVERAGE_MAX_DISTANCE", d.coverage_max_distance),
        }
    }

    /// The database URL, or a configuration error naming the variable.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| Error::Config("DATABASE_URL is not set".to_string()))
    }

    /// Maximum upload size in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }

    /// Per-request deadline for search index calls.
    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }

    /// Total Deep Research wall-clock budget.
    pub fn research_budget(&self) -> Duration {
        Duration::from_secs(self.research_budget_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let s = Settings::default();
        assert_eq!(s.chunk_size, 2500);
        assert_eq!(s.chunk_overlap, 250);
        assert_eq!(s.embedding_dim, 384);
        assert_eq!(s.image_embedding_dim, 768);
        assert_eq!(s.cache_ttl_semantic_secs, 300);
        assert_eq!(s.cache_ttl_llm_secs, 900);
        assert_eq!(s.research_budget_secs, 120);
        assert_eq!(s.research_top_k_local, 8);
        assert_eq!(s.research_top_k_web, 6);
        assert!(!s.persist_embeddings_in_metastore);
        assert!(!s.hybrid_mmr_enable);
        assert_eq!(s.search_backend, SearchBackend::SearchIndex);
        assert_eq!(s.web_provider, "none");
    }

    #[test]
    fn missing_database_url_is_config_error() {
        let s = Settings::default();
        assert!(matches!(
            s.require_database_url(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn max_upload_bytes_scales() {
        let s = Settings {
            max_upload_size_mb: 2,
            ..Default::default()
        };
        assert_eq!(s.max_upload_bytes(), 2 * 1024 * 1024);
    }
}
