//! Gateway to store capture messages

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::headers::Headers;
use crate::record::{decode_body, encode_body, MockResponse};

/// Capture call sent by the gateway for one inbound request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "CaptureRequestWire", try_from = "CaptureRequestWire")]
pub struct CaptureRequest {
    pub slug: String,
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub body: Bytes,
    pub query_params: BTreeMap<String, String>,
    pub ip: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureRequestWire {
    slug: String,
    method: String,
    path: String,
    #[serde(default)]
    headers: Headers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body_base64: Option<String>,
    #[serde(default)]
    query_params: BTreeMap<String, String>,
    #[serde(default)]
    ip: String,
}

impl From<CaptureRequest> for CaptureRequestWire {
    fn from(request: CaptureRequest) -> Self {
        let (body, body_base64) = encode_body(&request.body);
        Self {
            slug: request.slug,
            method: request.method,
            path: request.path,
            headers: request.headers,
            body,
            body_base64,
            query_params: request.query_params,
            ip: request.ip,
        }
    }
}

impl TryFrom<CaptureRequestWire> for CaptureRequest {
    type Error = String;

    fn try_from(wire: CaptureRequestWire) -> Result<Self, Self::Error> {
        let body = decode_body(wire.body, wire.body_base64)
            .map_err(|e| format!("invalid bodyBase64: {}", e))?;
        Ok(Self {
            slug: wire.slug,
            method: wire.method,
            path: wire.path,
            headers: wire.headers,
            body,
            query_params: wire.query_params,
            ip: wire.ip,
        })
    }
}

/// Store answer to a capture call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_response: Option<MockResponse>,
}

impl CaptureResponse {
    pub fn accepted(mock_response: Option<MockResponse>) -> Self {
        Self {
            success: true,
            error: None,
            mock_response,
        }
    }

    pub fn rejected(failure: &CaptureFailure) -> Self {
        Self {
            success: false,
            error: Some(failure.code().to_string()),
            mock_response: None,
        }
    }

    /// The failure carried by this response, if any.
    ///
    /// A response that is neither successful nor carries an error code is
    /// itself malformed and classified as `Other`.
    pub fn failure(&self) -> Option<CaptureFailure> {
        match self.error.as_deref() {
            Some(code) if !code.is_empty() => Some(CaptureFailure::from_code(code)),
            _ if self.success => None,
            _ => Some(CaptureFailure::Other(
                "store reported failure without an error code".to_string(),
            )),
        }
    }
}

/// Classified store rejection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureFailure {
    /// Endpoint does not exist
    NotFound,
    /// Ephemeral endpoint is past its expiry
    Expired,
    /// Quota exhausted for the current period
    LimitExceeded,
    /// Any other store error; the detail is for server-side logs only
    Other(String),
}

impl CaptureFailure {
    pub fn from_code(code: &str) -> Self {
        match code {
            "not_found" => Self::NotFound,
            "expired" => Self::Expired,
            "limit_exceeded" | "quota_exceeded" => Self::LimitExceeded,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::LimitExceeded => "limit_exceeded",
            Self::Other(detail) => detail,
        }
    }
}

impl fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(detail) => write!(f, "store error: {}", detail),
            known => f.write_str(known.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_codes() {
        assert_eq!(CaptureFailure::from_code("not_found"), CaptureFailure::NotFound);
        assert_eq!(CaptureFailure::from_code("expired"), CaptureFailure::Expired);
        assert_eq!(
            CaptureFailure::from_code("limit_exceeded"),
            CaptureFailure::LimitExceeded
        );
        assert_eq!(
            CaptureFailure::from_code("db exploded at shard 7"),
            CaptureFailure::Other("db exploded at shard 7".to_string())
        );
    }

    #[test]
    fn test_response_failure_classification() {
        let ok = CaptureResponse::accepted(None);
        assert_eq!(ok.failure(), None);

        let rejected = CaptureResponse::rejected(&CaptureFailure::Expired);
        assert_eq!(rejected.failure(), Some(CaptureFailure::Expired));

        let empty: CaptureResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(empty.failure(), Some(CaptureFailure::Other(_))));

        let blank_error: CaptureResponse =
            serde_json::from_str(r#"{"success":true,"error":""}"#).unwrap();
        assert_eq!(blank_error.failure(), None);
    }

    #[test]
    fn test_response_wire_names() {
        let json = r#"{"success":true,"mockResponse":{"status":201,"body":"created","headers":{"X-Mock":"1"}}}"#;
        let response: CaptureResponse = serde_json::from_str(json).unwrap();
        let mock = response.mock_response.unwrap();
        assert_eq!(mock.status, 201);
        assert_eq!(mock.headers.get("X-Mock").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_request_wire_shape() {
        let request = CaptureRequest {
            slug: "demo".to_string(),
            method: "PUT".to_string(),
            path: "/".to_string(),
            headers: Headers::new(),
            body: Bytes::from_static(b"payload"),
            query_params: BTreeMap::new(),
            ip: "10.0.0.1".to_string(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["body"], "payload");
        assert_eq!(json["queryParams"], serde_json::json!({}));

        let parsed: CaptureRequest = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, request);
    }
}
