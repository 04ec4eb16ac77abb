//! # spaces-index
//!
//! OpenSearch-compatible search/vector index adapter.
//!
//! Presents two logical indexes derived from the MetaStore:
//! - a **chunk index** (BM25 lexical with field boosts + HNSW cosine KNN)
//! - an **image index** (caption/OCR/tags + image-model KNN)
//!
//! All communication is plain REST over `reqwest`; raw backend scores are
//! min-max normalized per call before results leave this crate. Index
//! entries are always rebuildable from the MetaStore via `reindex`.

mod client;
mod types;

pub use client::SearchIndexClient;
pub use types::{BulkReport, IndexFilter, IndexedChunk, IndexedImage, RecencyDecay};
