//! # spaces-search
//!
//! The retrieval engine and single-shot RAG synthesis.
//!
//! Three retrieval modes (semantic / lexical / hybrid with RRF fusion) run
//! over either the search index or the MetaStore, always tenant-filtered,
//! with revisioned-cache fronting and optional recency decay and MMR
//! diversification.

pub mod mmr;
pub mod retriever;
pub mod rrf;
pub mod synthesizer;

pub use mmr::mmr_rerank;
pub use retriever::{HybridOptions, Retriever};
pub use rrf::rrf_fuse;
pub use synthesizer::{RagAnswer, Synthesizer};
