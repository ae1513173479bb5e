//! HTTP API route definitions.

use std::path::Path;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers::{health, info, pairs, ready, snapshot, stream, AppState};

/// Create the API router. Unmatched paths are served from `static_dir`.
pub fn create_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Queries
        .route("/api/info", get(info))
        .route("/api/pairs", get(pairs))
        .route("/api/orders/:pair", get(snapshot))
        // Diff stream
        .route("/ws", get(stream))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
