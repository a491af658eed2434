//! HTTP adapters - REST API implementations.

pub mod flow;

use axum::routing::get;
use axum::Router;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use flow::{flow_router, FlowAppState};

/// Full API router with tracing and a per-request timeout.
///
/// The timeout bounds how long a caller waits; a step already handed to the
/// engine keeps running after its request is dropped.
pub fn api_router(state: FlowAppState, request_timeout: Duration) -> Router {
    flow_router()
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
}

async fn health() -> &'static str {
    "ok"
}
