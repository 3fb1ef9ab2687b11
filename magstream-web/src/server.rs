//! axum server for Magstream
//!
//! Wires the stream controller and search service into a router and runs it
//! until the shutdown signal fires, then tears down every cached session.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::get;
use magstream_core::config::MagstreamConfig;
use magstream_core::{LocalSwarmEngine, SessionCache, StreamController};
use magstream_search::MediaSearchService;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::handlers::{api_search, api_status, stream_magnet};

/// State shared by every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Serves `/stream` requests from the session cache
    pub controller: StreamController,
    /// Serves `/search` requests
    pub search: MediaSearchService,
    /// When the server started, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Creates state with the start time set to now.
    pub fn new(controller: StreamController, search: MediaSearchService) -> Self {
        Self {
            controller,
            search,
            started_at: Instant::now(),
        }
    }

    /// The session cache behind the controller.
    pub fn cache(&self) -> &SessionCache {
        self.controller.cache()
    }
}

/// Builds the API router with permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(api_status))
        .route("/search", get(api_search))
        .route("/stream", get(stream_magnet))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves.
///
/// # Errors
/// - `std::io::Error` - Accepting connections failed
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Runs the server with the directory-backed swarm engine until Ctrl-C.
///
/// # Errors
/// - `Box<dyn std::error::Error>` - Invalid search settings, bind failure or
///   server I/O error
pub async fn run_server(config: MagstreamConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = LocalSwarmEngine::new(config.storage.clone());
    let cache = SessionCache::new(Arc::new(engine), config.cache.ttl);
    let controller = StreamController::new(cache.clone(), config.cache.ready_timeout);
    let search = MediaSearchService::from_config(&config.search)?;

    let listener = TcpListener::bind(config.server.bind_address()).await?;
    info!(
        "Magstream server running on http://{} (downloads in {})",
        listener.local_addr()?,
        config.storage.download_dir.display()
    );

    serve(listener, AppState::new(controller, search), shutdown_signal()).await?;

    info!("Shutting down");
    cache.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
