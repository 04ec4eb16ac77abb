//! Authenticated principal extraction.
//!
//! Session-cookie authentication lives in the gateway in front of this
//! service; the gateway forwards the resolved identity as `X-User-Id` and
//! `X-User-Email` headers. Requests without them are unauthorized.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;

/// The authenticated caller, as asserted by the gateway.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
}

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok())
            .ok_or_else(|| {
                ApiError(spaces_core::Error::Unauthorized(
                    "missing or invalid X-User-Id".into(),
                ))
            })?;

        let email = parts
            .headers
            .get("x-user-email")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| format!("user-{user_id}"));

        Ok(AuthUser { user_id, email })
    }
}
