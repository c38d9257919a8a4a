//! Client for the hookwire management API

use hookwire_proto::{CaptureRecord, Endpoint, MockResponse};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::stream::EventStream;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of an endpoint creation call
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEndpoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub ephemeral: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mock_response: Option<MockResponse>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.base.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ApiError> {
        let mut base =
            Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl(format!(
                "{}: scheme must be http or https",
                base_url
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        // No overall timeout: the event stream is long-lived. Plain calls
        // set their own per-request timeout.
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let code = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error);
        Err(ApiError::Status {
            status: status.as_u16(),
            code,
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        Ok(self
            .send(request.timeout(REQUEST_TIMEOUT))
            .await?
            .json::<T>()
            .await?)
    }

    pub async fn create_endpoint(&self, body: &CreateEndpoint) -> Result<Endpoint, ApiError> {
        let url = self.url(&["api", "endpoints"])?;
        let endpoint: Endpoint = self.json(self.client.post(url).json(body)).await?;
        debug!(slug = %endpoint.slug, "Created endpoint");
        Ok(endpoint)
    }

    pub async fn get_endpoint(&self, slug: &str) -> Result<Endpoint, ApiError> {
        let url = self.url(&["api", "endpoints", slug])?;
        self.json(self.client.get(url)).await
    }

    pub async fn delete_endpoint(&self, slug: &str) -> Result<(), ApiError> {
        let url = self.url(&["api", "endpoints", slug])?;
        self.send(self.client.delete(url).timeout(REQUEST_TIMEOUT))
            .await?;
        debug!(slug = %slug, "Deleted endpoint");
        Ok(())
    }

    /// Snapshot of recent requests, newest first
    pub async fn list_requests(
        &self,
        slug: &str,
        limit: usize,
    ) -> Result<Vec<CaptureRecord>, ApiError> {
        let mut url = self.url(&["api", "endpoints", slug, "requests"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        self.json(self.client.get(url)).await
    }

    pub async fn get_request(&self, slug: &str, id: &str) -> Result<CaptureRecord, ApiError> {
        let url = self.url(&["api", "endpoints", slug, "requests", id])?;
        self.json(self.client.get(url)).await
    }

    pub fn stream_url(&self, slug: &str) -> Result<Url, ApiError> {
        self.url(&["api", "stream", slug])
    }

    /// Open the live event stream of an endpoint.
    ///
    /// `header_timeout` bounds the wait for the response headers only; the
    /// body is governed by `idle_timeout`.
    pub async fn open_stream(
        &self,
        slug: &str,
        header_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<EventStream, ApiError> {
        let request = self
            .client
            .get(self.stream_url(slug)?)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        let response = tokio::time::timeout(header_timeout, self.send(request))
            .await
            .map_err(|_| ApiError::HeaderTimeout(header_timeout))??;
        Ok(EventStream::new(response, slug, idle_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_keep_base_path() {
        let api = ApiClient::new("https://hooks.example.com/v1", None).unwrap();
        assert_eq!(
            api.stream_url("demo").unwrap().as_str(),
            "https://hooks.example.com/v1/api/stream/demo"
        );

        let api = ApiClient::new("http://127.0.0.1:3001/", None).unwrap();
        assert_eq!(
            api.url(&["api", "endpoints", "a b"]).unwrap().as_str(),
            "http://127.0.0.1:3001/api/endpoints/a%20b"
        );
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(matches!(
            ApiClient::new("not a url", None),
            Err(ApiError::InvalidUrl(_))
        ));
        assert!(matches!(
            ApiClient::new("ftp://example.com", None),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let api = ApiClient::new("http://localhost:3001", Some("tok_123".to_string())).unwrap();
        assert!(!format!("{:?}", api).contains("tok_123"));
    }
}
