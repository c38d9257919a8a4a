//! Captured requests and the endpoints they are captured against

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::headers::Headers;
use crate::MAX_SLUG_LEN;

/// Validate a slug: 1 to 50 characters of `[A-Za-z0-9_-]`
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Synthetic response returned to senders of an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockResponse {
    pub status: u16,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl MockResponse {
    /// Configured status, or 200 when outside the valid 100-599 range
    pub fn effective_status(&self) -> u16 {
        if (100..=599).contains(&self.status) {
            self.status
        } else {
            200
        }
    }
}

/// A named capture target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock_response: Option<MockResponse>,
    #[serde(default)]
    pub is_ephemeral: bool,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Endpoint {
    /// Expiry only applies to ephemeral endpoints
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_ephemeral && self.expires_at.is_some_and(|expires| expires <= now)
    }
}

/// One inbound HTTP request as observed at the edge.
///
/// Immutable once persisted: consumers hold clones, never mutate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "CaptureRecordWire", try_from = "CaptureRecordWire")]
pub struct CaptureRecord {
    pub id: String,
    pub endpoint_slug: String,
    pub method: String,
    pub path: String,
    pub headers: Headers,
    pub query_params: BTreeMap<String, String>,
    pub body: Bytes,
    pub ip: String,
    pub received_at: DateTime<Utc>,
}

impl CaptureRecord {
    pub fn size(&self) -> usize {
        self.body.len()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

impl std::fmt::Display for CaptureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}  {:<6} {}  {}",
            self.received_at.format("%H:%M:%S"),
            self.method,
            self.path,
            format_size(self.size())
        )
    }
}

fn format_size(size: usize) -> String {
    if size < 1024 {
        format!("{}b", size)
    } else if size < 1024 * 1024 {
        format!("{:.1}kb", size as f64 / 1024.0)
    } else {
        format!("{:.1}mb", size as f64 / (1024.0 * 1024.0))
    }
}

/// Split a body into its UTF-8 text form or, failing that, base64
pub(crate) fn encode_body(body: &Bytes) -> (Option<String>, Option<String>) {
    if body.is_empty() {
        return (None, None);
    }
    match std::str::from_utf8(body) {
        Ok(text) => (Some(text.to_string()), None),
        Err(_) => (None, Some(STANDARD.encode(body))),
    }
}

pub(crate) fn decode_body(
    text: Option<String>,
    encoded: Option<String>,
) -> Result<Bytes, base64::DecodeError> {
    match (encoded, text) {
        (Some(encoded), _) => Ok(Bytes::from(STANDARD.decode(encoded)?)),
        (None, Some(text)) => Ok(Bytes::from(text)),
        (None, None) => Ok(Bytes::new()),
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptureRecordWire {
    id: String,
    endpoint_slug: String,
    method: String,
    path: String,
    #[serde(default)]
    headers: Headers,
    #[serde(default)]
    query_params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body_base64: Option<String>,
    #[serde(default)]
    ip: String,
    #[serde(default)]
    size: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    received_at: DateTime<Utc>,
}

impl From<CaptureRecord> for CaptureRecordWire {
    fn from(record: CaptureRecord) -> Self {
        let size = record.size();
        let (body, body_base64) = encode_body(&record.body);
        Self {
            id: record.id,
            endpoint_slug: record.endpoint_slug,
            method: record.method,
            path: record.path,
            headers: record.headers,
            query_params: record.query_params,
            body,
            body_base64,
            ip: record.ip,
            size,
            received_at: record.received_at,
        }
    }
}

impl TryFrom<CaptureRecordWire> for CaptureRecord {
    type Error = String;

    fn try_from(wire: CaptureRecordWire) -> Result<Self, Self::Error> {
        let body = decode_body(wire.body, wire.body_base64)
            .map_err(|e| format!("invalid bodyBase64: {}", e))?;
        Ok(Self {
            id: wire.id,
            endpoint_slug: wire.endpoint_slug,
            method: wire.method,
            path: wire.path,
            headers: wire.headers,
            query_params: wire.query_params,
            body,
            ip: wire.ip,
            received_at: wire.received_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record(body: &'static [u8]) -> CaptureRecord {
        CaptureRecord {
            id: "r1".to_string(),
            endpoint_slug: "demo".to_string(),
            method: "POST".to_string(),
            path: "/hooks/stripe".to_string(),
            headers: vec![("Content-Type", "application/json")].into_iter().collect(),
            query_params: BTreeMap::from([("a".to_string(), "1".to_string())]),
            body: Bytes::from_static(body),
            ip: "203.0.113.9".to_string(),
            received_at: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
        }
    }

    #[test]
    fn test_slug_validation() {
        assert!(is_valid_slug("abc-123_XYZ"));
        assert!(is_valid_slug(&"a".repeat(50)));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug(&"a".repeat(51)));
        assert!(!is_valid_slug("has space"));
        assert!(!is_valid_slug("dots.not.allowed"));
        assert!(!is_valid_slug("slash/no"));
    }

    #[test]
    fn test_text_body_travels_as_string() {
        let record = sample_record(br#"{"ok":true}"#);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["body"], r#"{"ok":true}"#);
        assert!(json.get("bodyBase64").is_none());
        assert_eq!(json["endpointSlug"], "demo");
        assert_eq!(json["queryParams"]["a"], "1");
        assert_eq!(json["receivedAt"], 1_700_000_000_123i64);
        assert_eq!(json["size"], 11);
    }

    #[test]
    fn test_binary_body_is_byte_faithful() {
        let record = sample_record(&[0xff, 0x00, 0xfe, 0x10]);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("bodyBase64"));

        let parsed: CaptureRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.body.as_ref(), &[0xff, 0x00, 0xfe, 0x10]);
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_record_without_body_or_headers() {
        let json = r#"{"id":"r2","endpointSlug":"demo","method":"GET","path":"/","receivedAt":0}"#;
        let parsed: CaptureRecord = serde_json::from_str(json).unwrap();

        assert!(parsed.body.is_empty());
        assert!(parsed.headers.is_empty());
        assert_eq!(parsed.ip, "");
    }

    #[test]
    fn test_mock_status_out_of_range_falls_back() {
        let mock = MockResponse {
            status: 99,
            body: String::new(),
            headers: BTreeMap::new(),
        };
        assert_eq!(mock.effective_status(), 200);

        let mock = MockResponse { status: 418, ..mock };
        assert_eq!(mock.effective_status(), 418);
    }

    #[test]
    fn test_only_ephemeral_endpoints_expire() {
        let now = Utc::now();
        let mut endpoint = Endpoint {
            slug: "demo".to_string(),
            name: None,
            mock_response: None,
            is_ephemeral: false,
            expires_at: Some(now - chrono::Duration::seconds(1)),
            created_at: now,
        };
        assert!(!endpoint.is_expired_at(now));

        endpoint.is_ephemeral = true;
        assert!(endpoint.is_expired_at(now));

        endpoint.expires_at = Some(now + chrono::Duration::hours(1));
        assert!(!endpoint.is_expired_at(now));
    }

    #[test]
    fn test_display_line() {
        let record = sample_record(b"hello");
        assert_eq!(record.to_string(), "22:13:20  POST   /hooks/stripe  5b");
    }
}
