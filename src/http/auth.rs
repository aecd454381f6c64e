//! Bearer-token authentication middleware.
//!
//! Validates `Authorization: Bearer <secret>` against the `RUNNER_API_KEY`
//! env var, read at call time. When the key is unset the service runs in
//! open mode and accepts all requests. Health and docs endpoints are always
//! public. The comparison is constant-time.

use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;

use super::types::ErrorResponse;

/// Paths that never require authentication.
pub const PUBLIC_PATHS: &[&str] = &["/health", "/docs", "/openapi.json"];

/// Check authorization on protected endpoints.
pub async fn require_bearer(request: Request, next: Next) -> Response {
    let api_key = std::env::var("RUNNER_API_KEY").unwrap_or_default();

    // Open mode: no key configured, allow everything.
    if api_key.is_empty() {
        return next.run(request).await;
    }

    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let Some(token) = header_value.strip_prefix("Bearer ") else {
        tracing::warn!(path = %request.uri().path(), "auth.missing");
        return unauthorized("Missing or invalid Authorization header");
    };

    let matches: bool = token.as_bytes().ct_eq(api_key.as_bytes()).into();
    if !matches {
        tracing::warn!(path = %request.uri().path(), "auth.invalid");
        return unauthorized("Invalid API key");
    }

    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}
