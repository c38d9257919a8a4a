//! Remote store reached over HTTP with a shared bearer secret

use async_trait::async_trait;
use bytes::BytesMut;
use hookwire_proto::{CaptureRequest, CaptureResponse};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::{CaptureOutcome, Store, StoreError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RESPONSE_LIMIT: usize = 1024 * 1024;

#[derive(Clone)]
pub struct HttpStoreConfig {
    /// Base URL; captures are posted to `{base_url}/capture`
    pub base_url: String,
    pub secret: String,
    pub timeout: Duration,
    pub response_limit: usize,
}

impl HttpStoreConfig {
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            secret: secret.into(),
            timeout: DEFAULT_TIMEOUT,
            response_limit: DEFAULT_RESPONSE_LIMIT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_response_limit(mut self, limit: usize) -> Self {
        self.response_limit = limit;
        self
    }
}

impl std::fmt::Debug for HttpStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStoreConfig")
            .field("base_url", &self.base_url)
            .field("secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("response_limit", &self.response_limit)
            .finish()
    }
}

#[derive(Debug)]
pub struct HttpStore {
    client: reqwest::Client,
    capture_url: String,
    config: HttpStoreConfig,
    breaker: CircuitBreaker,
}

impl HttpStore {
    pub fn new(config: HttpStoreConfig) -> Result<Self, StoreError> {
        Self::with_breaker(config, CircuitBreaker::default())
    }

    pub fn with_breaker(
        config: HttpStoreConfig,
        breaker: CircuitBreaker,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let capture_url = format!("{}/capture", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            capture_url,
            config,
            breaker,
        })
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn call(&self, request: &CaptureRequest) -> Result<CaptureOutcome, StoreError> {
        let mut response = self
            .client
            .post(&self.capture_url)
            .bearer_auth(&self.config.secret)
            .json(request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let limit = self.config.response_limit;
        if response.content_length().is_some_and(|len| len as usize > limit) {
            return Err(StoreError::ResponseTooLarge { limit });
        }

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(classify_transport)? {
            if body.len() + chunk.len() > limit {
                return Err(StoreError::ResponseTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        let parsed: Option<CaptureResponse> = serde_json::from_slice(&body).ok();
        match (status, parsed) {
            (status, Some(answer)) if status.is_success() || has_code(&answer) => {
                match answer.failure() {
                    None => Ok(CaptureOutcome {
                        mock_response: answer.mock_response,
                    }),
                    Some(failure) => Err(failure.into()),
                }
            }
            (StatusCode::NOT_FOUND, _) => Err(StoreError::NotFound),
            (StatusCode::GONE, _) => Err(StoreError::Expired),
            (StatusCode::TOO_MANY_REQUESTS, _) => Err(StoreError::LimitExceeded),
            (status, _) if status.is_success() => Err(StoreError::Decode(format!(
                "unparseable {} byte body",
                body.len()
            ))),
            (status, _) => Err(StoreError::Transport(format!("store answered {}", status))),
        }
    }
}

fn has_code(answer: &CaptureResponse) -> bool {
    answer.error.as_deref().is_some_and(|code| !code.is_empty())
}

fn classify_transport(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Transport(err.to_string())
    }
}

#[async_trait]
impl Store for HttpStore {
    async fn capture(&self, request: CaptureRequest) -> Result<CaptureOutcome, StoreError> {
        if !self.breaker.try_acquire() {
            return Err(StoreError::CircuitOpen);
        }

        let result = self.call(&request).await;
        match &result {
            Err(err) if err.is_store_fault() => {
                warn!(slug = %request.slug, error = %err, "Store call failed");
                self.breaker.record_failure();
            }
            _ => {
                debug!(slug = %request.slug, ok = result.is_ok(), "Store call completed");
                self.breaker.record_success();
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let config = HttpStoreConfig::new("https://store.internal/", "s3cr3t");
        let printed = format!("{:?}", config);
        assert!(!printed.contains("s3cr3t"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_capture_url_joins_cleanly() {
        let store = HttpStore::new(HttpStoreConfig::new("https://store.internal/", "s")).unwrap();
        assert_eq!(store.capture_url, "https://store.internal/capture");
    }
}
