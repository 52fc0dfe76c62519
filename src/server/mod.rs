//! HTTP API
//!
//! - `POST /crawl` validates a crawl request and starts the run in the background
//! - `GET /health` reports liveness and the number of active runs
//!
//! Every request passes through the correlation-id middleware and the tower-http
//! trace layer. Connections that stall while sending request headers are closed.

mod handlers;
mod lifecycle;
mod middleware;
mod serve;

pub use handlers::{ApiError, HealthResponse};
pub use lifecycle::{shutdown_signal, Lifecycle, LifecycleError, DEFAULT_READ_HEADER_TIMEOUT};
pub use middleware::{CorrelationId, CORRELATION_ID_HEADER};

use crate::crawler::CrawlLauncher;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Shared state of the HTTP handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub launcher: CrawlLauncher,
}

impl AppState {
    pub fn new(launcher: CrawlLauncher) -> Self {
        Self { launcher }
    }
}

/// Builds the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/crawl", post(handlers::crawl))
        .route("/health", get(handlers::health))
        .layer(axum::middleware::from_fn(middleware::correlation_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
