//! Live events delivered to observers of an endpoint

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{CaptureRecord, Endpoint};
use crate::sse::{encode_comment, encode_frame, SseFrame};

#[derive(Debug, Error)]
pub enum EventError {
    #[error("malformed {kind} event payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// One unit of fan-out
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// First event on a new subscription, carrying endpoint metadata
    Connected(Endpoint),
    /// A captured request
    Request(CaptureRecord),
    /// The endpoint is gone; no further events will follow
    EndpointDeleted { slug: String },
    /// Keep-alive, carries nothing
    Comment,
}

#[derive(Serialize, Deserialize)]
struct DeletedPayload {
    #[serde(default)]
    slug: String,
}

impl LiveEvent {
    pub const CONNECTED: &'static str = "connected";
    pub const REQUEST: &'static str = "request";
    pub const ENDPOINT_DELETED: &'static str = "endpoint_deleted";
    pub const COMMENT: &'static str = "comment";

    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::Connected(_) => Self::CONNECTED,
            LiveEvent::Request(_) => Self::REQUEST,
            LiveEvent::EndpointDeleted { .. } => Self::ENDPOINT_DELETED,
            LiveEvent::Comment => Self::COMMENT,
        }
    }

    /// JSON `data` for this event; `None` for keep-alives
    pub fn payload_json(&self) -> Result<Option<String>, EventError> {
        let kind = self.kind();
        let json = match self {
            LiveEvent::Connected(endpoint) => serde_json::to_string(endpoint),
            LiveEvent::Request(record) => serde_json::to_string(record),
            LiveEvent::EndpointDeleted { slug } => {
                serde_json::to_string(&DeletedPayload { slug: slug.clone() })
            }
            LiveEvent::Comment => return Ok(None),
        };
        json.map(Some)
            .map_err(|source| EventError::Payload { kind, source })
    }

    /// Wire form of this event
    pub fn to_frame(&self) -> Result<String, EventError> {
        Ok(match self.payload_json()? {
            Some(data) => encode_frame(self.kind(), &data),
            None => encode_comment("keepalive"),
        })
    }

    /// Interpret a decoded frame.
    ///
    /// Kinds this version does not know about yield `Ok(None)` so newer
    /// servers can add events without breaking older consumers.
    /// `endpoint_deleted` is terminal whatever its payload; a slug that cannot
    /// be read comes back empty.
    pub fn from_frame(frame: &SseFrame) -> Result<Option<LiveEvent>, EventError> {
        let event = match frame.event.as_str() {
            Self::CONNECTED => LiveEvent::Connected(parse(Self::CONNECTED, &frame.data)?),
            Self::REQUEST => LiveEvent::Request(parse(Self::REQUEST, &frame.data)?),
            Self::ENDPOINT_DELETED => LiveEvent::EndpointDeleted {
                slug: serde_json::from_str::<DeletedPayload>(&frame.data)
                    .map(|payload| payload.slug)
                    .unwrap_or_default(),
            },
            Self::COMMENT => LiveEvent::Comment,
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn parse<T: for<'de> Deserialize<'de>>(kind: &'static str, data: &str) -> Result<T, EventError> {
    serde_json::from_str(data).map_err(|source| EventError::Payload { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::SseDecoder;
    use crate::Headers;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn record() -> CaptureRecord {
        CaptureRecord {
            id: "r1".to_string(),
            endpoint_slug: "demo".to_string(),
            method: "POST".to_string(),
            path: "/".to_string(),
            headers: Headers::new(),
            query_params: BTreeMap::new(),
            body: Bytes::from_static(b"line1\nline2"),
            ip: "127.0.0.1".to_string(),
            received_at: Utc.timestamp_millis_opt(1_000).unwrap(),
        }
    }

    #[test]
    fn test_request_event_through_decoder() {
        let event = LiveEvent::Request(record());
        let wire = event.to_frame().unwrap();
        assert!(wire.starts_with("event: request\n"));

        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(wire.as_bytes()).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(LiveEvent::from_frame(&frames[0]).unwrap(), Some(event));
    }

    #[test]
    fn test_deleted_event() {
        let frame = SseFrame::new("endpoint_deleted", r#"{"slug":"gone"}"#);
        assert_eq!(
            LiveEvent::from_frame(&frame).unwrap(),
            Some(LiveEvent::EndpointDeleted {
                slug: "gone".to_string()
            })
        );
    }

    #[test]
    fn test_deleted_event_without_slug() {
        for data in ["{}", "", "gone", r#"{"slug":42}"#, "[]"] {
            let frame = SseFrame::new("endpoint_deleted", data);
            assert_eq!(
                LiveEvent::from_frame(&frame).unwrap(),
                Some(LiveEvent::EndpointDeleted {
                    slug: String::new()
                }),
                "{:?}",
                data
            );
        }
    }

    #[test]
    fn test_unknown_kind_skipped() {
        let frame = SseFrame::new("message", "hello");
        assert_eq!(LiveEvent::from_frame(&frame).unwrap(), None);
    }

    #[test]
    fn test_malformed_payload() {
        let frame = SseFrame::new("request", "{not json");
        let err = LiveEvent::from_frame(&frame).unwrap_err();
        assert!(err.to_string().starts_with("malformed request event payload"));
    }

    #[test]
    fn test_comment_is_keepalive() {
        assert_eq!(LiveEvent::Comment.payload_json().unwrap(), None);
        assert_eq!(LiveEvent::Comment.to_frame().unwrap(), ": keepalive\n\n");
    }
}
