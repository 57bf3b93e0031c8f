//! Calendar Adapters
//!
//! - **InMemoryCalendar** - Working-hours availability generated on the fly,
//!   bookings kept in memory

mod in_memory;

pub use in_memory::{InMemoryCalendar, WorkingHours};
