//! HTTP routes for the messaging endpoints.

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use super::handlers::{health, post_message, MessagingHandlers};

/// Creates the messaging router with request tracing and a per-request
/// timeout. `cors` is applied as given.
pub fn messaging_routes(
    handlers: MessagingHandlers,
    request_timeout: Duration,
    cors: CorsLayer,
) -> Router {
    Router::new()
        .route("/api/messages", post(post_message))
        .route("/health", get(health))
        .with_state(handlers)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
