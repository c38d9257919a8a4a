//! In-process store for standalone mode and tests
//!
//! Not durable. Keeps the newest records per endpoint up to a cap, counts
//! captures against an optional per-endpoint limit and deletes ephemeral
//! endpoints lazily on first access past their expiry.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use hookwire_fanout::{FanoutHub, Subscription};
use hookwire_proto::{is_valid_slug, CaptureRecord, CaptureRequest, Endpoint, LiveEvent, MockResponse};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{CaptureOutcome, Store, StoreError};

#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Records kept per endpoint, oldest evicted first
    pub record_cap: usize,
    /// Captures accepted per endpoint; `None` is unlimited
    pub request_limit: Option<u64>,
    pub ephemeral_ttl: Duration,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            record_cap: 1000,
            request_limit: None,
            ephemeral_ttl: Duration::from_secs(12 * 60 * 60),
        }
    }
}

/// Body of an endpoint creation call
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEndpoint {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default)]
    pub mock_response: Option<MockResponse>,
}

/// Body of an endpoint update call; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mock_response: Option<MockResponse>,
}

struct EndpointState {
    endpoint: Endpoint,
    records: VecDeque<CaptureRecord>,
    used: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    endpoints: DashMap<String, EndpointState>,
    hub: FanoutHub,
    config: MemoryStoreConfig,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn hub(&self) -> &FanoutHub {
        &self.hub
    }

    pub fn create_endpoint(&self, new: NewEndpoint) -> Result<Endpoint, StoreError> {
        if let Some(mock) = &new.mock_response {
            validate_mock(mock)?;
        }

        let slug = match new.slug {
            Some(slug) if !is_valid_slug(&slug) => {
                return Err(StoreError::InvalidEndpoint(format!("invalid slug: {}", slug)))
            }
            Some(slug) => slug,
            None => generate_slug(),
        };

        let now = Utc::now();
        let expires_at = new.ephemeral.then(|| {
            now + chrono::Duration::from_std(self.config.ephemeral_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(12))
        });
        let endpoint = Endpoint {
            slug: slug.clone(),
            name: new.name,
            mock_response: new.mock_response,
            is_ephemeral: new.ephemeral,
            expires_at,
            created_at: now,
        };

        match self.endpoints.entry(slug.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::SlugTaken(slug)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(EndpointState {
                    endpoint: endpoint.clone(),
                    records: VecDeque::new(),
                    used: 0,
                });
                info!(slug = %slug, ephemeral = endpoint.is_ephemeral, "Endpoint created");
                Ok(endpoint)
            }
        }
    }

    pub fn get_endpoint(&self, slug: &str) -> Result<Endpoint, StoreError> {
        let endpoint = self
            .endpoints
            .get(slug)
            .map(|state| state.endpoint.clone())
            .ok_or(StoreError::NotFound)?;
        if endpoint.is_expired_at(Utc::now()) {
            self.expire(slug);
            return Err(StoreError::Expired);
        }
        Ok(endpoint)
    }

    pub fn update_endpoint(&self, slug: &str, update: EndpointUpdate) -> Result<Endpoint, StoreError> {
        if let Some(mock) = &update.mock_response {
            validate_mock(mock)?;
        }
        self.get_endpoint(slug)?;

        let mut state = self.endpoints.get_mut(slug).ok_or(StoreError::NotFound)?;
        if let Some(name) = update.name {
            state.endpoint.name = Some(name);
        }
        if let Some(mock) = update.mock_response {
            state.endpoint.mock_response = Some(mock);
        }
        debug!(slug = %slug, "Endpoint updated");
        Ok(state.endpoint.clone())
    }

    /// Remove an endpoint and tell its live observers it is gone
    pub fn delete_endpoint(&self, slug: &str) -> Result<(), StoreError> {
        self.endpoints.remove(slug).ok_or(StoreError::NotFound)?;
        let notified = self.hub.close_endpoint(slug);
        info!(slug = %slug, notified, "Endpoint deleted");
        Ok(())
    }

    /// Stored records, newest first
    pub fn list_requests(&self, slug: &str, limit: usize) -> Result<Vec<CaptureRecord>, StoreError> {
        self.get_endpoint(slug)?;
        let state = self.endpoints.get(slug).ok_or(StoreError::NotFound)?;
        Ok(state.records.iter().take(limit).cloned().collect())
    }

    pub fn get_request(&self, slug: &str, id: &str) -> Result<CaptureRecord, StoreError> {
        self.get_endpoint(slug)?;
        let state = self.endpoints.get(slug).ok_or(StoreError::NotFound)?;
        state
            .records
            .iter()
            .find(|record| record.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    /// Subscribe to live events of an existing endpoint.
    ///
    /// Registers before checking the endpoint, so a delete that lands after
    /// the check still reaches the subscriber.
    pub fn subscribe(&self, slug: &str) -> Result<(Endpoint, Subscription), StoreError> {
        let subscription = self.hub.subscribe(slug);
        let endpoint = self.get_endpoint(slug)?;
        Ok((endpoint, subscription))
    }

    fn expire(&self, slug: &str) {
        let now = Utc::now();
        if self
            .endpoints
            .remove_if(slug, |_, state| state.endpoint.is_expired_at(now))
            .is_some()
        {
            self.hub.close_endpoint(slug);
            info!(slug = %slug, "Ephemeral endpoint expired");
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn capture(&self, request: CaptureRequest) -> Result<CaptureOutcome, StoreError> {
        let slug = request.slug.clone();

        // Stamped, stored and published under the endpoint's lock: subscribers
        // see captures in store order with non-decreasing timestamps.
        let mut state = self.endpoints.get_mut(&slug).ok_or(StoreError::NotFound)?;
        let now = Utc::now();
        if state.endpoint.is_expired_at(now) {
            drop(state);
            self.expire(&slug);
            return Err(StoreError::Expired);
        }
        if self
            .config
            .request_limit
            .is_some_and(|limit| state.used >= limit)
        {
            return Err(StoreError::LimitExceeded);
        }
        state.used += 1;

        let received_at = state
            .records
            .front()
            .map_or(now, |newest| newest.received_at.max(now));
        let record = CaptureRecord {
            id: Uuid::new_v4().to_string(),
            endpoint_slug: slug.clone(),
            method: request.method,
            path: request.path,
            headers: request.headers,
            query_params: request.query_params,
            body: request.body,
            ip: request.ip,
            received_at,
        };
        state.records.push_front(record.clone());
        state.records.truncate(self.config.record_cap);
        let mock_response = state.endpoint.mock_response.clone();

        debug!(slug = %slug, id = %record.id, "Captured request");
        self.hub.publish(&slug, LiveEvent::Request(record));
        drop(state);

        Ok(CaptureOutcome { mock_response })
    }
}

fn validate_mock(mock: &MockResponse) -> Result<(), StoreError> {
    if !(100..=599).contains(&mock.status) {
        return Err(StoreError::InvalidEndpoint(format!(
            "mock status {} outside 100-599",
            mock.status
        )));
    }
    Ok(())
}

fn generate_slug() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}
