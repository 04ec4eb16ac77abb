//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use spaces_core::error::ErrorKind;

/// API-facing error wrapper; renders a JSON body and the mapped status.
pub struct ApiError(pub spaces_core::Error);

impl From<spaces_core::Error> for ApiError {
    fn from(e: spaces_core::Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let (status, label) = match kind {
            ErrorKind::BadRequest => (StatusCode::BAD_REQUEST, "bad_request"),
            ErrorKind::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ErrorKind::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
            ErrorKind::Conflict => (StatusCode::CONFLICT, "conflict"),
            ErrorKind::Unsupported => (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported"),
            ErrorKind::DeadlineExceeded => (StatusCode::GATEWAY_TIMEOUT, "deadline_exceeded"),
            ErrorKind::TransientUpstream => (StatusCode::BAD_GATEWAY, "transient_upstream"),
            ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        // Internal details are logged, never sent to the caller.
        let message = match kind {
            ErrorKind::Internal => {
                error!(subsystem = "api", error = %self.0, "Internal error");
                "internal error".to_string()
            }
            ErrorKind::TransientUpstream => {
                warn!(subsystem = "api", error = %self.0, "Upstream failure");
                "upstream temporarily unavailable".to_string()
            }
            _ => self.0.to_string(),
        };

        (status, Json(json!({"error": label, "message": message}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spaces_core::Error;

    fn status_of(e: Error) -> StatusCode {
        ApiError(e).into_response().status()
    }

    #[test]
    fn maps_error_kinds_to_statuses() {
        assert_eq!(status_of(Error::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(Error::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(Error::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(Error::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(Error::Unsupported("mp3".into())),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            status_of(Error::DeadlineExceeded("x".into())),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(status_of(Error::Transient("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_of(Error::Internal("secret detail".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
