use hookwire_proto::CaptureFailure;
use thiserror::Error;

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("endpoint not found")]
    NotFound,

    #[error("endpoint expired")]
    Expired,

    #[error("request limit exceeded")]
    LimitExceeded,

    #[error("store rejected capture: {0}")]
    Rejected(String),

    #[error("store call timed out")]
    Timeout,

    #[error("store unreachable: {0}")]
    Transport(String),

    #[error("store response exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("malformed store response: {0}")]
    Decode(String),

    #[error("store circuit open, failing fast")]
    CircuitOpen,

    #[error("invalid endpoint definition: {0}")]
    InvalidEndpoint(String),

    #[error("slug already in use: {0}")]
    SlugTaken(String),
}

impl StoreError {
    /// Classification the gateway turns into a response status
    pub fn failure(&self) -> CaptureFailure {
        match self {
            StoreError::NotFound => CaptureFailure::NotFound,
            StoreError::Expired => CaptureFailure::Expired,
            StoreError::LimitExceeded => CaptureFailure::LimitExceeded,
            other => CaptureFailure::Other(other.to_string()),
        }
    }

    /// Errors that say the store itself is unhealthy, as opposed to a
    /// definitive answer about the endpoint
    pub fn is_store_fault(&self) -> bool {
        matches!(
            self,
            StoreError::Timeout
                | StoreError::Transport(_)
                | StoreError::ResponseTooLarge { .. }
                | StoreError::Decode(_)
        )
    }
}

impl From<CaptureFailure> for StoreError {
    fn from(failure: CaptureFailure) -> Self {
        match failure {
            CaptureFailure::NotFound => StoreError::NotFound,
            CaptureFailure::Expired => StoreError::Expired,
            CaptureFailure::LimitExceeded => StoreError::LimitExceeded,
            CaptureFailure::Other(detail) => StoreError::Rejected(detail),
        }
    }
}
