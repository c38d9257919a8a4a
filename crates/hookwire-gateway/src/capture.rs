//! The public capture route: `ANY /w/{slug}/{*path}`

use axum::extract::rejection::{BytesRejection, PathRejection};
use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use hookwire_proto::{is_valid_slug, CaptureRequest, Headers, MockResponse};
use hookwire_store::{Store, StoreError};
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::CaptureError;

const MAX_MOCK_HEADER_NAME: usize = 256;
const MAX_MOCK_HEADER_VALUE: usize = 8192;

/// Response headers a mock may not set
const BLOCKED_MOCK_HEADERS: &[&str] = &[
    "set-cookie",
    "strict-transport-security",
    "content-security-policy",
    "x-frame-options",
];

#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<dyn Store>,
    pub config: Arc<GatewayConfig>,
}

/// Transport peer, when the server was started with connect info
pub struct PeerAddr(pub Option<SocketAddr>);

impl<S: Send + Sync> FromRequestParts<S> for PeerAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PeerAddr(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0),
        ))
    }
}

pub async fn capture(
    State(state): State<GatewayState>,
    PeerAddr(peer): PeerAddr,
    params: Result<Path<HashMap<String, String>>, PathRejection>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, CaptureError> {
    let Path(params) = params.map_err(|_| CaptureError::InvalidSlug)?;
    let slug = params.get("slug").cloned().unwrap_or_default();
    if !is_valid_slug(&slug) {
        return Err(CaptureError::InvalidSlug);
    }

    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            CaptureError::PayloadTooLarge
        } else {
            CaptureError::UnreadableBody
        }
    })?;

    let path = normalize_path(params.get("path").map(String::as_str));
    let peer = peer.unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
    let ip = state.config.trusted_proxies.resolve(
        peer,
        header_str(&headers, "x-real-ip"),
        header_str(&headers, "x-forwarded-for"),
    );

    let request = CaptureRequest {
        slug: slug.clone(),
        method: method.as_str().to_ascii_uppercase(),
        path,
        headers: collect_headers(&headers),
        body,
        query_params: parse_query(uri.query()),
        ip,
    };

    debug!(slug = %slug, method = %request.method, path = %request.path, "Capturing request");

    let outcome = tokio::time::timeout(state.config.store_timeout, state.store.capture(request))
        .await
        .map_err(|_| StoreError::Timeout)??;

    Ok(match outcome.mock_response {
        Some(mock) => mock_response(&slug, &mock),
        None => default_response(),
    })
}

fn default_response() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "OK",
    )
        .into_response()
}

fn mock_response(slug: &str, mock: &MockResponse) -> Response {
    let status = StatusCode::from_u16(mock.effective_status()).unwrap_or(StatusCode::OK);
    let mut response = (status, mock.body.clone()).into_response();

    for (name, value) in &mock.headers {
        match sanitize_mock_header(name, value) {
            Some((name, value)) => {
                response.headers_mut().insert(name, value);
            }
            None => warn!(slug = %slug, header = %name, "Skipping disallowed mock header"),
        }
    }
    response
}

fn sanitize_mock_header(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    if name.len() > MAX_MOCK_HEADER_NAME || value.len() > MAX_MOCK_HEADER_VALUE {
        return None;
    }
    if name.contains(['\r', '\n']) || value.contains(['\r', '\n']) {
        return None;
    }
    if BLOCKED_MOCK_HEADERS
        .iter()
        .any(|blocked| blocked.eq_ignore_ascii_case(name))
    {
        return None;
    }
    let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
    let value = HeaderValue::from_str(value).ok()?;
    Some((name, value))
}

fn normalize_path(raw: Option<&str>) -> String {
    match raw {
        None | Some("") => "/".to_string(),
        Some(path) if path.starts_with('/') => path.to_string(),
        Some(path) => format!("/{}", path),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn collect_headers(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn parse_query(query: Option<&str>) -> BTreeMap<String, String> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(None), "/");
        assert_eq!(normalize_path(Some("")), "/");
        assert_eq!(normalize_path(Some("a/b")), "/a/b");
        assert_eq!(normalize_path(Some("/a")), "/a");
    }

    #[test]
    fn test_mock_header_rules() {
        assert!(sanitize_mock_header("X-Ok", "fine").is_some());
        assert!(sanitize_mock_header("Set-Cookie", "a=b").is_none());
        assert!(sanitize_mock_header("x-frame-options", "DENY").is_none());
        assert!(sanitize_mock_header("X-Split", "a\r\nInjected: yes").is_none());
        assert!(sanitize_mock_header(&"x".repeat(257), "v").is_none());
        assert!(sanitize_mock_header("X-Big", &"v".repeat(8193)).is_none());
        assert!(sanitize_mock_header("bad name", "v").is_none());
    }

    #[test]
    fn test_query_parsing() {
        let parsed = parse_query(Some("a=1&b=hello%20world&a=2"));
        assert_eq!(parsed.get("a").map(String::as_str), Some("2"));
        assert_eq!(parsed.get("b").map(String::as_str), Some("hello world"));
        assert!(parse_query(None).is_empty());
    }

    #[test]
    fn test_repeated_headers_collapse() {
        let mut map = HeaderMap::new();
        map.append("x-tag", HeaderValue::from_static("one"));
        map.append("x-tag", HeaderValue::from_static("two"));
        map.insert("content-type", HeaderValue::from_static("text/plain"));

        let headers = collect_headers(&map);
        assert_eq!(headers.get("X-Tag"), Some("one, two"));
        assert_eq!(headers.len(), 2);
    }
}
