//! HTTP server hosting the watch endpoint.
//!
//! Routes:
//!
//! - `GET /watch` — WebSocket upgrade into a watch session
//! - `GET /metrics` — watch metrics snapshot as JSON
//! - `GET /health` — liveness check

use std::future::Future;
use std::net::SocketAddr;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::ws::{ws_handler, WatchContext, WatchMetricsSnapshot, WsState};

/// Server bind configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    /// Creates a new server configuration.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Returns the `host:port` bind address.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Application state shared by all routes.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Collaborators and settings of every watch session.
    pub context: WatchContext,
    /// Cancelled when the server shuts down; every session derives from it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Creates application state with a fresh shutdown token.
    #[must_use]
    pub fn new(context: WatchContext) -> Self {
        Self {
            context,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns the WebSocket state derived from this application state.
    #[must_use]
    pub fn ws_state(&self) -> WsState {
        WsState::new(self.context.clone(), self.shutdown.clone())
    }
}

/// Watch API server.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Creates a new server.
    #[must_use]
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Builds the router.
    #[must_use]
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Binds the configured address and serves until `signal` resolves.
    ///
    /// Every open session is cancelled once the signal fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or serving fails.
    pub async fn run<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.addr()).await?;
        self.serve(listener, signal).await
    }

    /// Serves on an already bound listener until `signal` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if serving fails.
    pub async fn serve<F>(self, listener: TcpListener, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr: SocketAddr = listener.local_addr()?;
        info!("Watch API listening on {}", local_addr);

        let shutdown = self.state.shutdown.clone();
        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.await;
                info!("Shutdown signal received, closing sessions");
                shutdown.cancel();
            })
            .await
    }
}

/// Builds the router for the given state.
pub fn router(state: AppState) -> Router {
    let ws = Router::new()
        .route("/watch", get(ws_handler))
        .with_state(state.ws_state());

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(ws)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint.
async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Metrics snapshot endpoint.
async fn metrics_handler(State(state): State<AppState>) -> Json<WatchMetricsSnapshot> {
    Json(state.context.metrics.snapshot())
}
