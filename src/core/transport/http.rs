//! HTTP transport implementation.
//!
//! Serves one tool server over HTTP:
//! - `POST <rpc_path>`: request envelope in, response envelope out
//! - `GET /health`: liveness check used by the supervisor
//! - `GET /operations`: advertised catalog used by the router
//! - `POST /shutdown`: graceful stop requested by the orchestrator CLI
//! - `GET /`: server info

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use super::{HttpConfig, TransportError, TransportResult};
use crate::core::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::core::server::ToolServer;

/// HTTP transport handler.
pub struct HttpTransport {
    config: HttpConfig,
}

/// Application state shared across HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// The tool server instance.
    server: ToolServer,
    /// Path of the dispatch endpoint, echoed by the root handler.
    rpc_path: String,
    /// Fired by `POST /shutdown`.
    shutdown: Arc<Notify>,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given config.
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        self.config.address()
    }

    /// Build the axum router for `server`.
    pub fn router(&self, server: ToolServer, shutdown: Arc<Notify>) -> Router {
        let state = AppState {
            server,
            rpc_path: self.config.rpc_path.clone(),
            shutdown,
        };

        Router::new()
            .route(&self.config.rpc_path, post(handle_dispatch))
            .route("/health", get(health_check))
            .route("/operations", get(list_operations))
            .route("/shutdown", post(handle_shutdown))
            .route("/", get(root_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Run the HTTP transport until SIGINT/SIGTERM or `POST /shutdown`.
    ///
    /// In-flight requests are allowed to finish before this returns.
    pub async fn run(self, server: ToolServer) -> TransportResult<()> {
        let addr = self.address();
        let shutdown = Arc::new(Notify::new());
        let app = self.router(server.clone(), shutdown.clone());

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| TransportError::bind(&addr, e))?;

        info!("Ready - '{}' listening on {}", server.id(), addr);
        info!("  → Dispatch:   POST {}", self.config.rpc_path);
        info!("  → Health:     GET /health");
        info!("  → Operations: GET /operations");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown_signal() => {}
                    _ = shutdown.notified() => {
                        info!("Shutdown requested over HTTP");
                    }
                }
            })
            .await
            .map_err(|e| TransportError::http(e.to_string()))?;

        Ok(())
    }
}

/// Resolve on SIGINT or SIGTERM (Ctrl+C elsewhere).
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut sigint), Ok(mut sigterm)) = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) else {
        warn!("Failed to install signal handlers");
        return std::future::pending().await;
    };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, initiating graceful shutdown");
    } else {
        std::future::pending::<()>().await;
    }
}

/// Root handler - provides server info.
async fn root_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": state.server.id(),
        "version": state.server.version(),
        "transport": "HTTP",
        "endpoints": {
            "dispatch": state.rpc_path,
            "health": "/health",
            "operations": "/operations",
            "shutdown": "/shutdown"
        }
    }))
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.server.health())
}

/// Advertised operation catalog.
async fn list_operations(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "service": state.server.id(),
        "operations": state.server.catalog(),
    }))
}

/// Handle an operation request.
///
/// The body is parsed by hand so that malformed input still gets an error
/// envelope rather than the framework's plain-text rejection.
#[instrument(skip_all)]
async fn handle_dispatch(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let request: RequestEnvelope = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed request envelope: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ResponseEnvelope::error(format!("malformed request: {e}"))),
            );
        }
    };

    let response = state.server.handle(request).await;
    (StatusCode::OK, Json(response))
}

/// Request a graceful shutdown.
async fn handle_shutdown(State(state): State<AppState>) -> impl IntoResponse {
    state.shutdown.notify_one();
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "stopping", "service": state.server.id() })),
    )
}
