//! Tunnel relay client
//!
//! Subscribes to an endpoint's live event stream through the management API
//! and replays every captured request against a local HTTP target. The
//! connection is re-established with capped exponential backoff until the
//! session is cancelled or the endpoint disappears.

pub mod api;
pub mod error;
pub mod replay;
pub mod session;
pub mod stream;
pub mod target;

pub use api::{ApiClient, CreateEndpoint};
pub use error::{ApiError, RelayError};
pub use replay::{ReplayOutcome, Replayer};
pub use session::{
    create_tunnel_endpoint, ephemeral_name, parse_header, Backoff, ConnectionState, RelayEvent, TunnelConfig,
    TunnelConfigBuilder, TunnelSession,
};
pub use stream::{EventStream, DEFAULT_HEADER_TIMEOUT, DEFAULT_IDLE_TIMEOUT};
pub use target::LocalTarget;
