//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, the state machine contract and
//! error types that form the vocabulary of the conversation engine.

mod errors;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::UserId;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
