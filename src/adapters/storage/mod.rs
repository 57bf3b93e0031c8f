//! Storage Adapters
//!
//! Implementations of the ContextStore port.
//!
//! ## Available Adapters
//!
//! - **InMemoryContextStore** - One field map per user in process memory (tests, development)
//! - **RedisContextStore** - One Redis hash per user, one hash field per top-level field
//!
//! Both write with top-level merge semantics: fields in the written record
//! replace stored ones and anything else already stored is kept.

mod in_memory_context_store;
mod redis_context_store;

pub use in_memory_context_store::InMemoryContextStore;
pub use redis_context_store::RedisContextStore;
