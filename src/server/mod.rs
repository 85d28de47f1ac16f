//! HTTP API over the search pipeline.
//!
//! - `POST /api/v5/search` runs a search and returns the report as JSON
//! - `GET /health` reports service liveness only
//! - `GET /api/v5/status` reports uptime, search count and configured backends
//! - `GET /api/v5/molecules` lists the known-molecule baselines
//! - `GET /` describes the service

mod error;
mod handlers;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::PharmyrusConfig;
use crate::pipeline::{Pipeline, SharedPipeline};

pub use self::error::ApiError;

/// State shared by every handler.
pub struct AppState {
    pub pipeline: SharedPipeline,
    pub started_at: Instant,
    pub total_searches: AtomicU64,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(pipeline: SharedPipeline) -> Self {
        Self {
            pipeline,
            started_at: Instant::now(),
            total_searches: AtomicU64::new(0),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/api/v5/status", get(handlers::status))
        .route("/api/v5/molecules", get(handlers::molecules))
        .route("/api/v5/search", post(handlers::search))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Builds the pipeline from `config` and serves it on `host:port` until
/// Ctrl-C.
///
/// # Errors
///
/// Returns an error when the host is invalid, backends cannot be built, or
/// the listener fails to bind.
pub async fn run(host: &str, port: u16, config: PharmyrusConfig) -> anyhow::Result<()> {
    let ip: IpAddr = host
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid host address: {e}"))?;
    let bind = SocketAddr::new(ip, port);

    let backends = crate::sources::build_backends(&config.sources)?;
    let pipeline = Arc::new(Pipeline::new(backends, config.pipeline));
    info!(backends = ?pipeline.backend_names(), "pipeline ready");

    let app = build_router(AppState::new(pipeline));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP server on {bind}: {e}"))?;
    info!("Pharmyrus HTTP server listening on http://{bind}");
    info!("  Search endpoint: POST http://{bind}/api/v5/search");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down…");
        })
        .await?;
    Ok(())
}
