//! Scheduling workflow: slots, preferences and the booking machine.

pub mod machine;
mod preference;
mod slot;
mod state;

pub use machine::{
    SchedulingEffect, SchedulingEnv, SchedulingEvent, SchedulingTransition,
};
pub use preference::{SlotPreference, SlotQuery, TimeOfDay};
pub use slot::{date_label, Slot, SlotId, SlotKey};
pub use state::{BookedAppointment, SchedulingIntent, SchedulingPayload, SchedulingState};
