//! Application layer - the orchestrator and the services it coordinates.
//!
//! Domain machines are pure; everything here performs I/O through the ports,
//! wraps it in retries and caching, and serializes turns per user.

pub mod availability_cache;
pub mod handlers;
pub mod inquiry;
pub mod retry;
pub mod routing;
pub mod user_locks;
pub mod workflows;

pub use handlers::{Collaborators, EngineSettings, HandleMessageHandler};
pub use retry::{with_retry, RetryPolicy, Retryable};
pub use routing::{DomainRouter, RouteDecision};
