//! # spaces-research
//!
//! The Deep Research agent: an agentic loop over the retrieval engine that
//! plans sub-questions, evaluates evidence coverage, optionally consults the
//! public web, and synthesizes a cited answer with confidence metadata,
//! all under a hard wall-clock budget. On exhaustion it returns the best
//! partial answer instead of hanging.

pub mod agent;
pub mod budget;
pub mod confidence;
pub mod coverage;
pub mod followup;
pub mod planner;
pub mod session;
pub mod urls;
pub mod web;

pub use agent::{AskRequest, DeepResearchAgent, ResearchOutcome};
pub use budget::Budget;
pub use confidence::{confidence_score, ConfidenceInputs};
pub use coverage::{Coverage, CoverageThresholds};
pub use session::SessionStore;
pub use web::build_web_search;
