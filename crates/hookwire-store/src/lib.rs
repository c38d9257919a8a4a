//! Capture store backends
//!
//! The gateway only needs [`Store::capture`]. [`HttpStore`] forwards captures
//! to a remote store service; [`MemoryStore`] keeps everything in process and
//! also owns the fan-out hub used by the standalone stream endpoint.

pub mod breaker;
pub mod error;
pub mod http;
pub mod memory;

pub use breaker::{BreakerState, CircuitBreaker};
pub use error::StoreError;
pub use http::{HttpStore, HttpStoreConfig};
pub use memory::{EndpointUpdate, MemoryStore, MemoryStoreConfig, NewEndpoint};

use async_trait::async_trait;
use hookwire_proto::{CaptureRequest, MockResponse};

/// Result of an accepted capture
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureOutcome {
    pub mock_response: Option<MockResponse>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Persist one captured request and publish it to live observers.
    ///
    /// Must assign the record's id and receive time.
    async fn capture(&self, request: CaptureRequest) -> Result<CaptureOutcome, StoreError>;
}
