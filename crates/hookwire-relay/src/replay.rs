//! Replay of captured requests against a local target

use futures::StreamExt;
use hookwire_proto::{filter_replay_headers, CaptureRecord, Headers};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::target::LocalTarget;

pub const REPLAY_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAX_DRAINED_BODY: usize = 10 * 1024 * 1024;

/// Result of replaying one captured request
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayOutcome {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub status: Option<u16>,
    pub latency: Duration,
    pub body_size: usize,
    pub error: Option<String>,
}

impl ReplayOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.map(|s| s < 400).unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct Replayer {
    client: reqwest::Client,
    target: LocalTarget,
    extra_headers: Headers,
}

impl Replayer {
    pub fn new(target: LocalTarget, extra_headers: Headers) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(REPLAY_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| RelayError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            target,
            extra_headers,
        })
    }

    pub fn target(&self) -> &LocalTarget {
        &self.target
    }

    /// Replay `record` and describe what the local target answered.
    ///
    /// Failures are part of the outcome; nothing here is retried.
    pub async fn replay(&self, record: &CaptureRecord) -> ReplayOutcome {
        let started = Instant::now();
        let mut outcome = ReplayOutcome {
            request_id: record.id.clone(),
            method: record.method.clone(),
            path: record.path.clone(),
            status: None,
            latency: Duration::ZERO,
            body_size: 0,
            error: None,
        };

        match self.send(record).await {
            Ok((status, body_size)) => {
                outcome.status = Some(status);
                outcome.body_size = body_size;
            }
            Err(err) => outcome.error = Some(err),
        }
        outcome.latency = started.elapsed();

        debug!(
            id = %outcome.request_id,
            status = ?outcome.status,
            latency_ms = outcome.latency.as_millis() as u64,
            "Replayed request"
        );
        outcome
    }

    async fn send(&self, record: &CaptureRecord) -> Result<(u16, usize), String> {
        let method = Method::from_bytes(record.method.as_bytes())
            .map_err(|_| format!("invalid method '{}'", record.method))?;
        let url = self.target.url_for(&record.path, &record.query_params);
        let headers = to_header_map(&filter_replay_headers(&record.headers, &self.extra_headers));

        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .body(record.body.clone())
            .send()
            .await
            .map_err(describe)?;

        let status = response.status().as_u16();
        let mut drained = 0usize;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(describe)?;
            drained += chunk.len();
            if drained >= MAX_DRAINED_BODY {
                drained = MAX_DRAINED_BODY;
                break;
            }
        }

        Ok((status, drained))
    }
}

fn describe(err: reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timed out after {}s", REPLAY_TIMEOUT.as_secs())
    } else if err.is_connect() {
        "connection refused".to_string()
    } else {
        err.to_string()
    }
}

fn to_header_map(headers: &Headers) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => warn!(header = %name, "Skipping header that cannot be replayed"),
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_skips_invalid() {
        let headers: Headers = vec![
            ("X-Good", "1"),
            ("Bad Name", "2"),
            ("X-Bad-Value", "a\nb"),
        ]
        .into_iter()
        .collect();

        let map = to_header_map(&headers);

        assert_eq!(map.len(), 1);
        assert_eq!(map["x-good"], "1");
    }

    #[test]
    fn test_outcome_success() {
        let outcome = ReplayOutcome {
            request_id: "r1".to_string(),
            method: "POST".to_string(),
            path: "/".to_string(),
            status: Some(204),
            latency: Duration::from_millis(3),
            body_size: 0,
            error: None,
        };
        assert!(outcome.is_success());

        let failed = ReplayOutcome {
            status: Some(502),
            ..outcome.clone()
        };
        assert!(!failed.is_success());

        let unreachable = ReplayOutcome {
            status: None,
            error: Some("connection refused".to_string()),
            ..outcome
        };
        assert!(!unreachable.is_success());
    }
}
