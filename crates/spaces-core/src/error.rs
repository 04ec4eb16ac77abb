//! Error types for SpacesAI.

use thiserror::Error;

/// Result type alias using the SpacesAI error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for SpacesAI operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed request, unknown mode, dimension mismatch.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Constraint violation (duplicate email, duplicate chunk index).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing or invalid authentication.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (tenancy violation).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Rejected file type or capability.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Temporary upstream failure (DB/index/cache/web/LLM); retryable.
    #[error("Transient upstream error: {0}")]
    Transient(String),

    /// Request or sub-call breached its deadline.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Database operation failed (wraps sqlx::Error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedding generation failed.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// LLM inference/generation failed.
    #[error("Inference error: {0}")]
    Inference(String),

    /// Search index operation failed.
    #[error("Search error: {0}")]
    Search(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed.
    #[error("Request error: {0}")]
    Request(String),

    /// File I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Assertion or invariant violation; logged, never leaks internals.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Protocol-agnostic failure classification (maps to HTTP at the edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Unsupported,
    DeadlineExceeded,
    TransientUpstream,
    Internal,
}

impl Error {
    /// Classify into the protocol-agnostic failure kinds.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::BadRequest,
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            Error::Transient(_)
            | Error::Embedding(_)
            | Error::Inference(_)
            | Error::Search(_)
            | Error::Request(_) => ErrorKind::TransientUpstream,
            Error::Database(e) => classify_sqlx(e),
            _ => ErrorKind::Internal,
        }
    }

    /// Whether a bounded retry is worth attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientUpstream)
    }
}

/// Map sqlx errors onto failure kinds: unique/foreign-key violations surface
/// as `Conflict`, row-not-found as `NotFound`, everything else as transient.
fn classify_sqlx(e: &sqlx::Error) -> ErrorKind {
    match e {
        sqlx::Error::RowNotFound => ErrorKind::NotFound,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") | Some("23503") => ErrorKind::Conflict,
            _ => ErrorKind::TransientUpstream,
        },
        _ => ErrorKind::TransientUpstream,
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::DeadlineExceeded(e.to_string())
        } else {
            Error::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("unknown mode".to_string());
        assert_eq!(err.to_string(), "Invalid input: unknown mode");
    }

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("document 42".to_string());
        assert_eq!(err.to_string(), "Not found: document 42");
    }

    #[test]
    fn test_error_display_unsupported() {
        let err = Error::Unsupported("audio/mpeg".to_string());
        assert_eq!(err.to_string(), "Unsupported: audio/mpeg");
    }

    #[test]
    fn test_kind_validation_is_bad_request() {
        assert_eq!(
            Error::Validation("x".into()).kind(),
            ErrorKind::BadRequest
        );
    }

    #[test]
    fn test_kind_transient_is_retryable() {
        assert!(Error::Transient("index down".into()).is_retryable());
        assert!(!Error::NotFound("nope".into()).is_retryable());
        assert!(!Error::Forbidden("nope".into()).is_retryable());
    }

    #[test]
    fn test_kind_row_not_found() {
        let err = Error::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
