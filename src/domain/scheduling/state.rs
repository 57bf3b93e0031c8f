//! Scheduling workflow states and payload.

use serde::{Deserialize, Serialize};

use super::preference::SlotPreference;
use super::slot::Slot;
use crate::domain::foundation::{StateMachine, Timestamp};
use crate::domain::verification::PatientRecord;

/// Position of a user inside the scheduling workflow.
///
/// Main track: `CollectingPreferences → OfferingSlots → AwaitingConfirmation
/// → Finalizing → Done`. `Cancelling` and `Rescheduling` merge back into
/// `OfferingSlots`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingState {
    #[default]
    CollectingPreferences,
    OfferingSlots,
    AwaitingConfirmation,
    Finalizing,
    Done,
    Cancelling,
    Rescheduling,
}

impl SchedulingState {
    pub const ALL: [SchedulingState; 7] = [
        SchedulingState::CollectingPreferences,
        SchedulingState::OfferingSlots,
        SchedulingState::AwaitingConfirmation,
        SchedulingState::Finalizing,
        SchedulingState::Done,
        SchedulingState::Cancelling,
        SchedulingState::Rescheduling,
    ];
}

impl StateMachine for SchedulingState {
    fn name(&self) -> &'static str {
        match self {
            SchedulingState::CollectingPreferences => "collecting_preferences",
            SchedulingState::OfferingSlots => "offering_slots",
            SchedulingState::AwaitingConfirmation => "awaiting_confirmation",
            SchedulingState::Finalizing => "finalizing",
            SchedulingState::Done => "done",
            SchedulingState::Cancelling => "cancelling",
            SchedulingState::Rescheduling => "rescheduling",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SchedulingState::*;
        match self {
            CollectingPreferences => vec![OfferingSlots, Done],
            OfferingSlots => vec![AwaitingConfirmation, Done],
            // a rejected confirmation goes back to the list
            AwaitingConfirmation => vec![Finalizing, OfferingSlots],
            // a slot taken in the meantime re-opens the list
            Finalizing => vec![Done, OfferingSlots],
            Done => vec![],
            Cancelling => vec![OfferingSlots, Done],
            Rescheduling => vec![OfferingSlots, Done],
        }
    }
}

/// Why the scheduling workflow was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingIntent {
    #[default]
    Book,
    Cancel,
    Reschedule,
}

/// An appointment created through the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedAppointment {
    pub event_id: String,
    pub slot: Slot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

/// Fields the scheduling workflow carries between turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SchedulingPayload {
    #[serde(default)]
    pub intent: SchedulingIntent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default)]
    pub preference: SlotPreference,
    /// The list actually sent to the user.
    #[serde(default)]
    pub offered: Vec<Slot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_issued_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<Slot>,
    /// Existing appointment being cancelled or rescheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_event: Option<String>,
    /// Event created by this run of the workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booked_event: Option<String>,
    /// Whether the last search already fell back to earliest-available.
    #[serde(default)]
    pub widened: bool,
    /// Text shown ahead of the next offer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    /// Patient handed over by the verification workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<PatientRecord>,
}

impl SchedulingPayload {
    /// Holds a confirmed booking that must not be evicted from the stack.
    pub fn holds_booking(&self) -> bool {
        self.booked_event.is_some() || self.target_event.is_some()
    }
}
