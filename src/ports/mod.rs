//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the engine and the outside world. Adapters implement these ports.
//!
//! - `ContextStore` - per-user conversation documents
//! - `AIProvider` - classification and free-form answers
//! - `CalendarProvider` - availability and appointment events
//! - `PatientRegistry` - lookup of existing patients
//! - `PaymentProvider` - hosted payment links

mod ai_provider;
mod calendar;
mod context_store;
mod external_error;
mod patient_registry;
mod payment_provider;

pub use ai_provider::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, FinishReason, Message,
    MessageRole, ProviderInfo, RequestMetadata, TokenUsage,
};
pub use calendar::{CalendarProvider, NewEvent};
pub use context_store::{ContextStore, ContextStoreError, StoredContext, StoredFrame};
pub use external_error::ExternalError;
pub use patient_registry::PatientRegistry;
pub use payment_provider::{PaymentLink, PaymentLinkRequest, PaymentProvider};
