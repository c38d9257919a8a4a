//! Hookwire Protocol Definitions
//!
//! Core data model, store wire messages, live event framing and the header
//! policies shared by the capture gateway and the tunnel relay.

pub mod events;
pub mod header_policy;
pub mod headers;
pub mod messages;
pub mod record;
pub mod sse;
pub mod trust;

pub use events::{EventError, LiveEvent};
pub use header_policy::{filter_replay_headers, is_stripped_on_replay, STRIPPED_ON_REPLAY};
pub use headers::Headers;
pub use messages::{CaptureFailure, CaptureRequest, CaptureResponse};
pub use record::{is_valid_slug, CaptureRecord, Endpoint, MockResponse};
pub use sse::{encode_comment, encode_frame, SseDecoder, SseError, SseFrame, DEFAULT_MAX_LINE};
pub use trust::{sanitize_ip, TrustError, TrustedProxies};

/// Maximum accepted capture body size (100 KiB)
pub const MAX_BODY_SIZE: usize = 100 * 1024;

/// Maximum slug length
pub const MAX_SLUG_LEN: usize = 50;
