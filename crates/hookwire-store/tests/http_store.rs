//! HttpStore against an in-process fake store service

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use hookwire_proto::{CaptureRequest, Headers};
use hookwire_store::{CircuitBreaker, HttpStore, HttpStoreConfig, Store, StoreError};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct FakeStore {
    calls: Arc<AtomicUsize>,
}

async fn capture(
    State(fake): State<FakeStore>,
    headers: HeaderMap,
    Json(request): Json<CaptureRequest>,
) -> Response {
    fake.calls.fetch_add(1, Ordering::SeqCst);

    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer topsecret") {
        return (StatusCode::UNAUTHORIZED, "no").into_response();
    }

    match request.slug.as_str() {
        "mocked" => Json(serde_json::json!({
            "success": true,
            "mockResponse": {"status": 201, "body": "made", "headers": {"X-From": "store"}}
        }))
        .into_response(),
        "plain" => Json(serde_json::json!({"success": true})).into_response(),
        "echo-body" => {
            let ok = request.body.as_ref() == [0xde, 0xad, 0xbe, 0xef];
            let error = if ok { "" } else { "body mismatch" };
            Json(serde_json::json!({"success": ok, "error": error})).into_response()
        }
        "missing" => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"success": false, "error": "not_found"})),
        )
            .into_response(),
        "old" => Json(serde_json::json!({"success": false, "error": "expired"})).into_response(),
        "busy" => StatusCode::TOO_MANY_REQUESTS.into_response(),
        "broken" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"success": false, "error": "pg: connection refused"})),
        )
            .into_response(),
        "huge" => "x".repeat(4096).into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(serde_json::json!({"success": true})).into_response()
        }
        _ => StatusCode::BAD_GATEWAY.into_response(),
    }
}

async fn spawn_fake() -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/capture", post(capture))
        .with_state(FakeStore {
            calls: calls.clone(),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), calls)
}

fn request(slug: &str) -> CaptureRequest {
    CaptureRequest {
        slug: slug.to_string(),
        method: "POST".to_string(),
        path: "/".to_string(),
        headers: Headers::new(),
        body: Bytes::from_static(b"{}"),
        query_params: BTreeMap::new(),
        ip: "127.0.0.1".to_string(),
    }
}

fn store(base: &str) -> HttpStore {
    HttpStore::new(
        HttpStoreConfig::new(base, "topsecret")
            .with_timeout(Duration::from_millis(300))
            .with_response_limit(1024),
    )
    .unwrap()
}

#[tokio::test]
async fn test_mock_response_passed_through() {
    let (base, _) = spawn_fake().await;
    let outcome = store(&base).capture(request("mocked")).await.unwrap();

    let mock = outcome.mock_response.unwrap();
    assert_eq!(mock.status, 201);
    assert_eq!(mock.body, "made");
    assert_eq!(mock.headers.get("X-From").map(String::as_str), Some("store"));

    let plain = store(&base).capture(request("plain")).await.unwrap();
    assert_eq!(plain.mock_response, None);
}

#[tokio::test]
async fn test_binary_body_reaches_store_intact() {
    let (base, _) = spawn_fake().await;
    let mut req = request("echo-body");
    req.body = Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]);

    store(&base).capture(req).await.unwrap();
}

#[tokio::test]
async fn test_error_codes_classified() {
    let (base, _) = spawn_fake().await;
    let store = store(&base);

    assert_eq!(store.capture(request("missing")).await, Err(StoreError::NotFound));
    assert_eq!(store.capture(request("old")).await, Err(StoreError::Expired));
    assert_eq!(store.capture(request("busy")).await, Err(StoreError::LimitExceeded));
    assert_eq!(
        store.capture(request("broken")).await,
        Err(StoreError::Rejected("pg: connection refused".to_string()))
    );
}

#[tokio::test]
async fn test_oversized_response_rejected() {
    let (base, _) = spawn_fake().await;
    let err = store(&base).capture(request("huge")).await.unwrap_err();
    assert_eq!(err, StoreError::ResponseTooLarge { limit: 1024 });
}

#[tokio::test]
async fn test_slow_store_times_out() {
    let (base, _) = spawn_fake().await;
    let err = store(&base).capture(request("slow")).await.unwrap_err();
    assert_eq!(err, StoreError::Timeout);
}

#[tokio::test]
async fn test_breaker_fails_fast_after_repeated_faults() {
    let (base, calls) = spawn_fake().await;
    let store = HttpStore::with_breaker(
        HttpStoreConfig::new(&base, "topsecret"),
        CircuitBreaker::new(3, Duration::from_secs(30)),
    )
    .unwrap();

    for _ in 0..3 {
        assert!(matches!(
            store.capture(request("unknown-route")).await,
            Err(StoreError::Transport(_))
        ));
    }
    assert_eq!(store.capture(request("plain")).await, Err(StoreError::CircuitOpen));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
