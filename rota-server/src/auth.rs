//! Bearer-token gate for the API.
//!
//! Front ends share one secret with the server. Requester ids arrive in
//! request bodies, so every route that trusts them (admin operations and
//! the command grammar) needs the token; without one configured those
//! routes stay closed.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

/// Reject unless a token is configured and presented.
pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    let Some(expected) = state.config().auth.api_token.as_deref() else {
        return Err(AppError::forbidden(
            "this route is disabled until an API token is configured",
        ));
    };
    check(&request, expected)?;
    Ok(next.run(request).await)
}

/// Enforce the token only when one is configured.
pub async fn optional_api_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    if let Some(expected) = state.config().auth.api_token.as_deref() {
        check(&request, expected)?;
    }
    Ok(next.run(request).await)
}

fn check(request: &Request, expected: &str) -> AppResult<()> {
    let presented = bearer_token(request).ok_or_else(|| {
        debug!(uri = %request.uri(), "missing bearer token");
        AppError::unauthorized("missing bearer token")
    })?;
    if !tokens_match(presented, expected) {
        debug!(uri = %request.uri(), "bearer token mismatch");
        return Err(AppError::unauthorized("invalid bearer token"));
    }
    Ok(())
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Compares every byte so timing does not leak the matching prefix.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let (presented, expected) = (presented.as_bytes(), expected.as_bytes());
    presented.len() == expected.len()
        && presented
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn with_header(value: &str) -> Request {
        Request::builder()
            .header(header::AUTHORIZATION, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn extracts_bearer_tokens_only() {
        assert_eq!(bearer_token(&with_header("Bearer s3cret")), Some("s3cret"));
        assert_eq!(bearer_token(&with_header("Basic czNjcmV0")), None);
        assert_eq!(
            bearer_token(&Request::builder().body(Body::empty()).unwrap()),
            None
        );
    }

    #[test]
    fn token_comparison_needs_exact_match() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cre", "s3cret"));
        assert!(!tokens_match("s3creT", "s3cret"));
    }
}
