//! Structured logging field name constants.
//!
//! All crates use these constants for consistent structured logging so log
//! aggregation can query by standardized field names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, operation completions |
//! | DEBUG | Decision points, intermediate values |
//! | TRACE | Per-item iteration (search hits, chunks) |

/// Correlation ID propagated across request → ingestion → sub-calls (UUIDv7).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the event: "api", "search", "db", "index", "cache",
/// "inference", "ingest", "research".
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem, e.g. "retriever", "rrf", "ollama", "pool".
pub const COMPONENT: &str = "component";

/// Logical operation name, e.g. "hybrid", "bulk_index", "ask".
pub const OPERATION: &str = "op";

/// Tenant user id.
pub const USER_ID: &str = "user_id";

/// Tenant space id.
pub const SPACE_ID: &str = "space_id";

/// Document id being operated on.
pub const DOCUMENT_ID: &str = "document_id";

/// Research conversation id.
pub const CONVERSATION_ID: &str = "conversation_id";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of chunks processed.
pub const CHUNK_COUNT: &str = "chunk_count";

/// Model name used for inference.
pub const MODEL: &str = "model";

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
