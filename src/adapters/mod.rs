//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the engine to external systems:
//! - `ai` - OpenAI-compatible completion client and a mock
//! - `calendar` - In-memory working-hours calendar
//! - `http` - Messaging webhook (axum)
//! - `payment` - Stripe Checkout links and a mock
//! - `registry` - In-memory patient registry
//! - `storage` - Conversation context stores (in-memory, Redis)

pub mod ai;
pub mod calendar;
pub mod http;
pub mod payment;
pub mod registry;
pub mod storage;

pub use ai::{MockAIProvider, OpenAIConfig, OpenAIProvider};
pub use calendar::InMemoryCalendar;
pub use payment::{MockPaymentProvider, StripeConfig, StripePaymentLinks};
pub use registry::InMemoryPatientRegistry;
pub use storage::{InMemoryContextStore, RedisContextStore};
