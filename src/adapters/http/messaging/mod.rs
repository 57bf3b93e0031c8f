//! HTTP adapter for the messaging gateway.
//!
//! The gateway posts each inbound message and relays the returned payload
//! to the patient.

mod dto;
mod handlers;
mod routes;

pub use dto::{ErrorResponse, HealthResponse, InboundMessageRequest};
pub use handlers::MessagingHandlers;
pub use routes::messaging_routes;
