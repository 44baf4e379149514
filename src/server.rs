//! HTTP viewer for the investigation memory.
//!
//! Lets caregivers browse what the agent concluded and correct an estimate
//! by hand:
//!
//! - `GET /health`
//! - `GET /api/investigations`: every investigation, in memory order
//! - `PUT /api/investigations/:index` with `{"estimate": "normal" | "anomalous"}`
//! - `GET /api/stats`: run log counters
//!
//! # Architecture
//!
//! ```text
//! Viewer ──→ GET/PUT /api/investigations ──→ [memory lock] ──→ memory.json
//!                                                 ↑
//!                               run loop (one orchestrator run per tick)
//! ```
//!
//! Memory access goes through a blocking task holding the same lock as the
//! run loop, so there is only ever one writer.

use crate::core::{Investigation, Label};
use crate::store::{MemoryStore, StoreError};
use crate::transparency::{RunStats, SharedRunLog};
use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Lock shared by the run loop and every viewer request.
pub type MemoryLock = Arc<Mutex<()>>;

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Investigation memory
    pub memory: MemoryStore,
    /// Run counters shown by `/api/stats`
    pub stats: SharedRunLog,
    /// Serializes memory access with the run loop
    pub lock: MemoryLock,
}

impl ServerConfig {
    pub fn new(port: u16, memory: MemoryStore, stats: SharedRunLog) -> Self {
        Self {
            port,
            memory,
            stats,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Share an existing lock, typically the run loop's.
    pub fn with_lock(mut self, lock: MemoryLock) -> Self {
        self.lock = lock;
        self
    }
}

/// Human correction of one estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRequest {
    pub estimate: Label,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

fn store_error(e: StoreError) -> ApiError {
    match e {
        StoreError::IndexOutOfRange { .. } => {
            api_error(StatusCode::NOT_FOUND, e.to_string(), "NOT_FOUND")
        }
        _ => {
            tracing::error!(error = %e, "memory access failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), "STORE_ERROR")
        }
    }
}

/// Shared server state
struct ServerState {
    memory: MemoryStore,
    stats: SharedRunLog,
    lock: MemoryLock,
}

impl ServerState {
    /// Run `f` against memory on the blocking pool while holding the lock.
    async fn with_memory<T, F>(self: &Arc<Self>, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&MemoryStore) -> Result<T, StoreError> + Send + 'static,
    {
        let state = Arc::clone(self);
        let joined = tokio::task::spawn_blocking(move || {
            // Store writes are atomic, so a poisoned lock guards no torn state
            let _guard = state.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&state.memory)
        })
        .await;

        match joined {
            Ok(result) => result.map_err(store_error),
            Err(e) => Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("memory task failed: {e}"),
                "TASK_FAILED",
            )),
        }
    }
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/investigations
async fn list_investigations(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<Investigation>>, ApiError> {
    let investigations = state.with_memory(|memory| memory.read_all()).await?;
    Ok(Json(investigations))
}

/// PUT /api/investigations/:index
///
/// Replaces the estimate of one investigation. The situation itself is
/// never edited.
async fn correct_investigation(
    State(state): State<Arc<ServerState>>,
    Path(index): Path<usize>,
    Json(request): Json<CorrectionRequest>,
) -> Result<Json<Investigation>, ApiError> {
    if request.estimate == Label::Unknown {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "estimate must be 'normal' or 'anomalous'",
            "INVALID_ESTIMATE",
        ));
    }

    let corrected = state
        .with_memory(move |memory| memory.update_estimate_at(index, request.estimate))
        .await?;

    tracing::info!(index, estimate = %corrected.estimate, "estimate corrected by viewer");
    Ok(Json(corrected))
}

/// GET /api/stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<RunStats> {
    Json(state.stats.stats())
}

/// Build the router without binding a socket.
fn router(config: &ServerConfig) -> Router {
    let state = Arc::new(ServerState {
        memory: config.memory.clone(),
        stats: Arc::clone(&config.stats),
        lock: Arc::clone(&config.lock),
    });

    Router::new()
        .route("/health", get(health))
        .route("/api/investigations", get(list_investigations))
        .route("/api/investigations/:index", put(correct_investigation))
        .route("/api/stats", get(stats))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(&config);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Care agent viewer listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
