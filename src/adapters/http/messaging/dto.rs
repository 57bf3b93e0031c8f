//! HTTP DTOs for the messaging endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::conversation::{InboundMessage, MessageKind};
use crate::domain::foundation::{UserId, ValidationError};

// ════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════

/// Message as posted by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessageRequest {
    pub user_id: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub content: String,
}

impl InboundMessageRequest {
    /// Validates the sender id.
    pub fn into_message(self) -> Result<InboundMessage, ValidationError> {
        Ok(InboundMessage {
            user_id: UserId::new(self.user_id)?,
            kind: self.kind,
            content: self.content,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
        }
    }
}
