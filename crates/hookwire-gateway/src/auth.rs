//! Bearer token check for the standalone API

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;

/// Token the API expects; `None` disables the check
#[derive(Clone, Default)]
pub struct ApiToken(pub Option<Arc<str>>);

impl ApiToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.is_empty()).map(Arc::from))
    }
}

fn extract_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Constant-time comparison
fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

pub async fn require_token(
    State(expected): State<ApiToken>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = expected.0.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer);

    match presented {
        Some(token) if tokens_match(token, expected) => Ok(next.run(request).await),
        Some(_) => {
            debug!("Bearer auth: invalid token");
            Err(ApiError::Unauthorized)
        }
        None => {
            debug!("Bearer auth: missing token");
            Err(ApiError::Unauthorized)
        }
    }
}
