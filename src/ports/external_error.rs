//! Error shared by the calendar, registry and payment ports.

use thiserror::Error;

/// Failure talking to an external system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u32 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,

    /// The resource changed under us, e.g. the slot was just booked.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl ExternalError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Returns true if this error is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExternalError::Timeout { .. }
                | ExternalError::Network(_)
                | ExternalError::Server { .. }
                | ExternalError::RateLimited { .. }
        )
    }
}
