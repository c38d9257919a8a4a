//! Standalone management API and live event stream
//!
//! Only mounted when the gateway runs on the in-process store.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream::Stream;
use hookwire_proto::{CaptureRecord, Endpoint, LiveEvent};
use hookwire_store::{EndpointUpdate, MemoryStore, NewEndpoint};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::auth::{require_token, ApiToken};
use crate::error::ApiError;

pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<MemoryStore>,
}

pub fn router(store: Arc<MemoryStore>, token: ApiToken) -> Router {
    Router::new()
        .route("/api/endpoints", axum::routing::post(create_endpoint))
        .route(
            "/api/endpoints/{slug}",
            get(get_endpoint)
                .patch(update_endpoint)
                .delete(delete_endpoint),
        )
        .route("/api/endpoints/{slug}/requests", get(list_requests))
        .route("/api/endpoints/{slug}/requests/{id}", get(get_request))
        .route("/api/stream/{slug}", get(stream_events))
        .with_state(ApiState { store })
        .layer(middleware::from_fn_with_state(token, require_token))
}

async fn create_endpoint(
    State(state): State<ApiState>,
    Json(new): Json<NewEndpoint>,
) -> Result<(StatusCode, Json<Endpoint>), ApiError> {
    let endpoint = state.store.create_endpoint(new)?;
    Ok((StatusCode::CREATED, Json(endpoint)))
}

async fn get_endpoint(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<Json<Endpoint>, ApiError> {
    Ok(Json(state.store.get_endpoint(&slug)?))
}

async fn update_endpoint(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
    Json(update): Json<EndpointUpdate>,
) -> Result<Json<Endpoint>, ApiError> {
    Ok(Json(state.store.update_endpoint(&slug, update)?))
}

async fn delete_endpoint(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_endpoint(&slug)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

/// Snapshot of stored requests, newest first
async fn list_requests(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<CaptureRecord>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    Ok(Json(state.store.list_requests(&slug, limit)?))
}

async fn get_request(
    State(state): State<ApiState>,
    Path((slug, id)): Path<(String, String)>,
) -> Result<Json<CaptureRecord>, ApiError> {
    Ok(Json(state.store.get_request(&slug, &id)?))
}

/// Live events for one endpoint: `connected`, then `request` per capture,
/// and `endpoint_deleted` before the stream closes
async fn stream_events(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (endpoint, subscription) = state.store.subscribe(&slug)?;
    info!(slug = %slug, "Stream client connected");

    let connected = LiveEvent::Connected(endpoint);
    let stream = futures::stream::once(async move { connected })
        .chain(subscription)
        .filter_map(|event| to_sse_event(&event));

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEPALIVE_INTERVAL).text("keepalive")))
}

fn to_sse_event(event: &LiveEvent) -> Option<Result<Event, Infallible>> {
    match event.payload_json() {
        Ok(Some(data)) => Some(Ok(Event::default().event(event.kind()).data(data))),
        Ok(None) => Some(Ok(Event::default().comment("keepalive"))),
        Err(err) => {
            warn!(error = %err, "Dropping unserializable live event");
            None
        }
    }
}
