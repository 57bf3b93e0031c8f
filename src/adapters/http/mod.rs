//! HTTP adapters - REST API implementations.

pub mod messaging;

pub use messaging::{messaging_routes, MessagingHandlers};
