//! # spaces-ingest
//!
//! The ingestion pipeline: blob persistence, content extraction, chunking,
//! embedding, the single-transaction MetaStore write, the best-effort
//! search-index dual-write, and cache revision bumps.
//!
//! One file's ingestion is internally sequential; many files may be
//! ingested concurrently. The MetaStore write is the only atomic step;
//! everything downstream of it is eventually consistent and recoverable
//! through [`Reindexer`].

pub mod blob;
pub mod extract;
pub mod ingestor;
pub mod reindex;
pub mod retry;

pub use blob::{blob_key, sanitize_email, FilesystemBlobStore};
pub use extract::ExtractionRegistry;
pub use ingestor::{IngestRequest, Ingestor};
pub use reindex::{ReindexScope, Reindexer};
pub use retry::with_backoff;
