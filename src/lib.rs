//! Clinic Concierge - conversation orchestration for a clinic's chat channel
//!
//! Routes each inbound message to the scheduling, payment or coverage
//! verification workflow, keeps per-user conversation context, and answers
//! general questions in between.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
