//! # spaces-core
//!
//! Core types, traits, and configuration for SpacesAI.
//!
//! This crate provides the foundational data structures, capability traits,
//! and environment-driven settings that every other SpacesAI crate depends on.

pub mod chunker;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod ranking;
pub mod textnorm;
pub mod traits;

// Re-export commonly used types at crate root
pub use chunker::{ChunkParams, RecursiveChunker, TextChunk};
pub use config::Settings;
pub use error::{Error, Result};
pub use models::*;
pub use textnorm::{
    fix_hyphenation, insert_heading_boundaries, normalize_whitespace, strip_repeating_lines,
};
pub use traits::*;
