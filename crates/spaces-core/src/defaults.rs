//! Centralized default constants for SpacesAI.
//!
//! **This module is the single source of truth** for shared default values.
//! All crates reference these constants instead of defining their own magic
//! numbers. Organized by domain area.

// =============================================================================
// CHUNKING
// =============================================================================

/// Maximum characters per chunk for text splitting.
pub const CHUNK_SIZE: usize = 2500;

/// Overlap characters shared between adjacent chunks.
pub const CHUNK_OVERLAP: usize = 250;

/// Separator preference order for the recursive splitter.
pub const CHUNK_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// Default text embedding model (Ollama).
pub const EMBED_MODEL: &str = "all-minilm";

/// Default text embedding vector dimension.
pub const EMBED_DIMENSION: usize = 384;

/// Default image embedding model.
pub const IMAGE_EMBED_MODEL: &str = "nomic-embed-vision";

/// Default image embedding vector dimension.
pub const IMAGE_EMBED_DIMENSION: usize = 768;

/// Batch size for embedding requests.
pub const EMBED_BATCH_SIZE: usize = 64;

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// RETRIEVAL & RANKING
// =============================================================================

/// Reciprocal Rank Fusion constant (Cormack et al. 2009 default).
pub const RRF_K0: f32 = 60.0;

/// Lexical field boost for chunk body text.
pub const BOOST_TEXT: f32 = 1.0;

/// Lexical field boost for document titles.
pub const BOOST_TITLE: f32 = 2.5;

/// Lexical field boost for file names.
pub const BOOST_FILE_NAME: f32 = 2.0;

/// Gaussian recency decay scale in days.
pub const RECENCY_SCALE_DAYS: f64 = 30.0;

/// Weight applied to the recency component of a score.
pub const RECENCY_WEIGHT: f64 = 0.25;

/// Default top-k for search requests.
pub const SEARCH_TOP_K: usize = 10;

/// MMR diversification lambda (relevance/diversity trade-off).
pub const MMR_LAMBDA: f32 = 0.5;

// =============================================================================
// CACHE
// =============================================================================

/// TTL for cached retrieval results in seconds.
pub const CACHE_TTL_SEMANTIC_SECS: u64 = 300;

/// TTL for cached LLM answers in seconds.
pub const CACHE_TTL_LLM_SECS: u64 = 900;

/// Consecutive cache failures before the circuit breaker opens.
pub const CACHE_FAILURE_THRESHOLD: u32 = 5;

/// Circuit-breaker cooldown window in seconds.
pub const CACHE_COOLDOWN_SECS: u64 = 60;

/// Cache key schema version (rendered as `v{N}`); bump when payload shapes change.
pub const CACHE_SCHEMA_VERSION: &str = "1";

// =============================================================================
// SEARCH INDEX
// =============================================================================

/// Default chunk index name.
pub const CHUNK_INDEX: &str = "spacesai_chunks";

/// Default image index name.
pub const IMAGE_INDEX: &str = "spacesai_images";

/// Default index shard count.
pub const INDEX_SHARDS: u32 = 3;

/// Default index replica count.
pub const INDEX_REPLICAS: u32 = 1;

/// Search index request timeout in seconds.
pub const INDEX_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// DEEP RESEARCH
// =============================================================================

/// Total wall-clock budget for one Deep Research run, in seconds.
pub const RESEARCH_BUDGET_SECS: u64 = 120;

/// Remaining-budget floor below which phases short-circuit to synthesis.
pub const RESEARCH_PHASE_FLOOR_SECS: f64 = 5.0;

/// Local retrieval top-k per sub-question.
pub const RESEARCH_TOP_K_LOCAL: usize = 8;

/// Web search top-k.
pub const RESEARCH_TOP_K_WEB: usize = 6;

/// Rewrite-and-retry loops after weak local coverage.
pub const RESEARCH_RETRY_LOOPS: u32 = 1;

/// Missing-concept loops.
pub const RESEARCH_MISSING_LOOPS: u32 = 1;

/// Max targeted retrievals per missing-concept loop.
pub const RESEARCH_MISSING_TOP_K: usize = 6;

/// Confidence below this threshold emits follow-up questions.
pub const RESEARCH_CONFIDENCE_THRESHOLD: f32 = 0.4;

/// Floor used for best-partial and no-LLM answers.
pub const RESEARCH_CONFIDENCE_BASELINE: f32 = 0.3;

/// Per-fetch web timeout in seconds.
pub const RESEARCH_WEB_TIMEOUT_SECS: u64 = 10;

/// Minimum Jaccard relevance for an emitted follow-up question.
pub const RESEARCH_FOLLOWUP_RELEVANCE_MIN: f32 = 0.08;

/// Maximum follow-up questions per answer.
pub const RESEARCH_FOLLOWUP_MAX: usize = 2;

/// Messages retained per research session.
pub const RESEARCH_MESSAGE_RETENTION: usize = 40;

/// Coverage: minimum hit count for "strong".
pub const COVERAGE_MIN_HITS: usize = 4;

/// Coverage: minimum unique documents for "strong".
pub const COVERAGE_MIN_DOCS: usize = 2;

/// Coverage: maximum best cosine distance for "strong".
pub const COVERAGE_MAX_DISTANCE: f32 = 0.55;

// =============================================================================
// INGESTION
// =============================================================================

/// Maximum upload size in megabytes.
pub const MAX_UPLOAD_SIZE_MB: u64 = 200;

/// Files up to this many bytes are buffered in memory; larger spool to disk.
pub const UPLOAD_SPOOL_THRESHOLD_BYTES: usize = 4 * 1024 * 1024;

/// Retry attempts for retryable ingestion steps.
pub const INGEST_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff in milliseconds.
pub const INGEST_BACKOFF_BASE_MS: u64 = 200;

/// Per-command timeout for external extraction tools (seconds).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 60;

/// Minimum extracted characters per PDF page before the fallback parser runs.
pub const PDF_SPARSE_CHARS_PER_PAGE: usize = 50;

/// Thumbnail bounding box edge in pixels.
pub const THUMBNAIL_EDGE: u32 = 512;

/// Caption model timeout in seconds before falling back to the small model.
pub const CAPTION_TIMEOUT_SECS: u64 = 20;

// =============================================================================
// GENERATION
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default Ollama generation model.
pub const GEN_MODEL: &str = "llama3.2:latest";

/// Timeout for generation requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 60;

/// Max tokens for single-shot RAG answers.
pub const RAG_MAX_TOKENS: u32 = 512;

/// Max characters of context handed to the generator.
pub const GEN_CONTEXT_CHAR_LIMIT: usize = 16_000;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 8000;

/// Default database pool size.
pub const DB_POOL_MAX: u32 = 10;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_separators_end_with_empty() {
        // The final "" separator is the hard character split; required so the
        // recursive splitter always terminates.
        assert_eq!(CHUNK_SEPARATORS.last(), Some(&""));
    }

    #[test]
    fn overlap_smaller_than_chunk() {
        assert!(CHUNK_OVERLAP < CHUNK_SIZE);
    }

    #[test]
    fn ttls_are_spec_values() {
        assert_eq!(CACHE_TTL_SEMANTIC_SECS, 300);
        assert_eq!(CACHE_TTL_LLM_SECS, 900);
    }
}
