//! HTTP server setup and routing

use crate::device::GestureRelay;
use crate::error::{Error, Result};
use crate::metadata::MetadataClient;
use crate::playback::PlayoutEngine;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: PlayoutEngine,
    /// Host capability fed by `POST /gesture`
    pub gestures: Arc<GestureRelay>,
    /// Resolves `{track_id}` load requests (None = inline tracks only)
    pub metadata: Option<Arc<MetadataClient>>,
}

/// Build the router with all routes
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(super::handlers::health))
        // Channel status
        .route("/channels", get(super::handlers::list_channels))
        .route("/channels/:channel", get(super::handlers::get_channel))
        // Lifecycle commands
        .route("/channels/:channel/load", post(super::handlers::load))
        .route("/channels/:channel/play", post(super::handlers::play))
        .route("/channels/:channel/pause", post(super::handlers::pause))
        .route("/channels/:channel/stop", post(super::handlers::stop))
        .route("/channels/:channel/seek", post(super::handlers::seek))
        .route("/channels/:channel/volume", post(super::handlers::set_volume))
        .route("/channels/:channel/next", post(super::handlers::prebuffer_next))
        .route("/channels/:channel/unload", post(super::handlers::unload))
        // Host gesture relay
        .route("/gesture", post(super::handlers::gesture))
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API on `port` until `shutdown` resolves
pub async fn run<F>(port: u16, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
