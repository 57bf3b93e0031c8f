//! Domain layer - pure conversation logic.
//!
//! Nothing in here performs I/O. Workflow machines describe side effects as
//! values and the application layer carries them out.

pub mod conversation;
pub mod decision;
pub mod foundation;
pub mod payment;
pub mod routing;
pub mod scheduling;
pub mod verification;
