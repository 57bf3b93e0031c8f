//! HTTP handlers for the messaging endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::application::HandleMessageHandler;

use super::dto::{ErrorResponse, HealthResponse, InboundMessageRequest};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct MessagingHandlers {
    handle_message: Arc<HandleMessageHandler>,
}

impl MessagingHandlers {
    pub fn new(handle_message: Arc<HandleMessageHandler>) -> Self {
        Self { handle_message }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP handlers
// ════════════════════════════════════════════════════════════════════════════

/// POST /api/messages - Process one inbound message
///
/// Always answers 200 with a payload once the message is well-formed; engine
/// failures surface as a technical-difficulty reply, not as an HTTP error.
pub async fn post_message(
    State(handlers): State<MessagingHandlers>,
    Json(req): Json<InboundMessageRequest>,
) -> Response {
    let message = match req.into_message() {
        Ok(message) => message,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::bad_request(e.to_string())),
            )
                .into_response()
        }
    };

    tracing::debug!(user_id = %message.user_id, kind = ?message.kind, "inbound message");
    let payload = handlers.handle_message.handle(message).await;
    (StatusCode::OK, Json(payload)).into_response()
}

/// GET /health - Liveness check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
