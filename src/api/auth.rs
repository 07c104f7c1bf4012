// =============================================================================
// Admin Token Authentication
// =============================================================================
//
// Operator endpoints require `Authorization: Bearer <token>` where the token
// matches `AURORA_ADMIN_TOKEN`.  The WebSocket route cannot carry headers from
// a browser, so it passes the same token as a `?token=` query parameter and
// checks it with `validate_token`.
//
// The environment is read per request so the token can be rotated without a
// restart.  An unset or empty token rejects every authenticated call.
// =============================================================================

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

pub const ADMIN_TOKEN_ENV: &str = "AURORA_ADMIN_TOKEN";

fn expected_token() -> Option<String> {
    std::env::var(ADMIN_TOKEN_ENV).ok().filter(|t| !t.is_empty())
}

/// Byte-wise comparison that always walks the full slice.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extractor guarding operator routes.  Carries the accepted token.
#[derive(Debug)]
pub struct AuthBearer(pub String);

#[derive(Debug)]
pub struct AuthRejection(&'static str);

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (StatusCode::FORBIDDEN, Json(serde_json::json!({ "error": self.0 }))).into_response()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthBearer
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(expected) = expected_token() else {
            warn!("{ADMIN_TOKEN_ENV} is not set, rejecting operator request");
            return Err(AuthRejection("admin token not configured"));
        };

        let presented = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match presented {
            Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => {
                Ok(AuthBearer(token.to_string()))
            }
            Some(_) => {
                warn!(path = %parts.uri.path(), "invalid admin token presented");
                Err(AuthRejection("invalid authorization token"))
            }
            None => Err(AuthRejection("missing authorization token")),
        }
    }
}

/// Check a token passed outside the `Authorization` header.
pub fn validate_token(token: &str) -> bool {
    expected_token().is_some_and(|expected| constant_time_eq(token.as_bytes(), expected.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_tokens_match() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn differing_tokens_do_not_match() {
        assert!(!constant_time_eq(b"s3cret", b"s3creT"));
        assert!(!constant_time_eq(b"short", b"shorter"));
        assert!(!constant_time_eq(b"\x00", b"\x01"));
    }
}
