use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get};
use axum::{Json, Router};
use hookwire_store::{MemoryStore, Store};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api;
use crate::auth::ApiToken;
use crate::capture::{capture, GatewayState};
use crate::config::GatewayConfig;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Capture gateway, optionally serving the standalone API
pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    store: Arc<dyn Store>,
    standalone: Option<Arc<MemoryStore>>,
}

impl GatewayServer {
    /// Gateway in front of an external store
    pub fn new(config: GatewayConfig, store: Arc<dyn Store>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            standalone: None,
        }
    }

    /// Gateway plus management API and live streams over an in-process store
    pub fn standalone(config: GatewayConfig, store: Arc<MemoryStore>) -> Self {
        Self {
            config: Arc::new(config),
            store: store.clone(),
            standalone: Some(store),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let state = GatewayState {
            store: self.store.clone(),
            config: self.config.clone(),
        };

        let capture_routes = Router::new()
            .route("/w/{slug}", any(capture))
            .route("/w/{slug}/", any(capture))
            .route("/w/{slug}/{*path}", any(capture))
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(state);

        let mut router = Router::new()
            .route("/health", get(health))
            .merge(capture_routes);

        if let Some(store) = &self.standalone {
            router = router.merge(api::router(
                store.clone(),
                ApiToken::new(self.config.api_token.clone()),
            ));
        }

        router.layer(TraceLayer::new_for_http()).layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.config.trusted_proxies.trusts_everyone() {
            warn!("No trusted proxies configured; X-Real-Ip and X-Forwarded-For are trusted from any peer");
        }
        if self.standalone.is_some() && self.config.api_token.is_none() {
            warn!("Standalone API is running without a bearer token");
        }

        let router = self.build_router();
        info!("Capture gateway listening on {}", listener.local_addr()?);

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("Capture gateway stopped");
        Ok(())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
