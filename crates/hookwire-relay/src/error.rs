use hookwire_proto::EventError;
use thiserror::Error;

/// Errors talking to the hookwire API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API answered {status}{}", code_suffix(.code))]
    Status { status: u16, code: Option<String> },

    #[error("no response headers within {0:?}")]
    HeaderTimeout(std::time::Duration),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" ({})", c))
        .unwrap_or_default()
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Tunnel relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid tunnel configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid local target '{0}'")]
    InvalidTarget(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("event stream error: {0}")]
    Stream(String),

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("endpoint '{0}' was deleted")]
    EndpointDeleted(String),
}

impl RelayError {
    /// Conditions reconnecting cannot fix
    pub fn is_fatal(&self) -> bool {
        match self {
            RelayError::EndpointDeleted(_)
            | RelayError::InvalidConfig(_)
            | RelayError::InvalidTarget(_) => true,
            RelayError::Api(err) => matches!(err.status(), Some(401 | 403 | 404 | 410)),
            RelayError::Stream(_) | RelayError::Event(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        for status in [401, 403, 404, 410] {
            let err = RelayError::Api(ApiError::Status { status, code: None });
            assert!(err.is_fatal(), "{} should be fatal", status);
        }
        for status in [500, 502, 503, 429] {
            let err = RelayError::Api(ApiError::Status { status, code: None });
            assert!(!err.is_fatal(), "{} should be retried", status);
        }
        assert!(RelayError::EndpointDeleted("x".to_string()).is_fatal());
        assert!(!RelayError::Stream("reset".to_string()).is_fatal());
        assert!(!RelayError::Api(ApiError::HeaderTimeout(std::time::Duration::from_secs(30))).is_fatal());
    }

    #[test]
    fn test_status_message() {
        let err = ApiError::Status {
            status: 404,
            code: Some("not_found".to_string()),
        };
        assert_eq!(err.to_string(), "API answered 404 (not_found)");
    }
}
