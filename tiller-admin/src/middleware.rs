use crate::server::AdminState;
use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

pub const AUTH_HEADER: &str = "x-auth-token";

/// Reject requests whose `X-Auth-Token` does not match the configured token.
///
/// With no token configured every request passes.
pub async fn require_token(
    State(state): State<Arc<AdminState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ref expected) = state.token else {
        return next.run(request).await;
    };
    let presented = request
        .headers()
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if tokens_match(expected, presented) {
        return next.run(request).await;
    }
    warn!(
        method = %request.method(),
        uri = %request.uri(),
        "Rejected request with missing or wrong auth token"
    );
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "unauthorized" })),
    )
        .into_response()
}

/// Compare fixed-length digests so the comparison time does not depend on
/// where the tokens first differ.
fn tokens_match(expected: &str, presented: &str) -> bool {
    Sha256::digest(expected.as_bytes()) == Sha256::digest(presented.as_bytes())
}

/// Count requests and their latency per matched route.
pub async fn track_metrics(
    State(state): State<Arc<AdminState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.metrics.is_enabled() {
        return next.run(request).await;
    }
    let handler = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = request.method().clone();
    let start = Instant::now();

    let response = next.run(request).await;
    state.metrics.record_request(
        &handler,
        method.as_str(),
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret", "s3cre"));
        assert!(!tokens_match("s3cret", ""));
    }
}
