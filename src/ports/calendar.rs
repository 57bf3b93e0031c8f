//! Calendar Port - availability and appointment events.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};

use super::ExternalError;
use crate::domain::foundation::UserId;

/// Appointment to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub user_id: UserId,
    pub start: DateTime<FixedOffset>,
    pub title: String,
    pub patient_name: Option<String>,
    /// Repeating a create with the same key returns the event it made.
    pub idempotency_key: String,
}

impl NewEvent {
    pub fn new(
        user_id: UserId,
        start: DateTime<FixedOffset>,
        title: impl Into<String>,
        patient_name: Option<String>,
    ) -> Self {
        let idempotency_key = format!("booking-{}-{}", user_id, start.timestamp());
        Self {
            user_id,
            start,
            title: title.into(),
            patient_name,
            idempotency_key,
        }
    }
}

/// Port for the clinic calendar.
///
/// Event ids are stable strings owned by the calendar. Implementations do
/// not retry; callers go through the retry wrapper.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Free slot start times in `[start, end)`, in clinic local time.
    async fn list_available(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DateTime<FixedOffset>>, ExternalError>;

    /// Books a slot. A slot that is no longer free is a `Conflict`, unless
    /// it holds the event created earlier under the same idempotency key.
    async fn create_event(&self, event: NewEvent) -> Result<String, ExternalError>;

    /// Moves an event, returning its (possibly new) id. Moving an event to
    /// the start it already has succeeds.
    async fn reschedule_event(
        &self,
        event_id: &str,
        start: DateTime<FixedOffset>,
    ) -> Result<String, ExternalError>;

    async fn cancel_event(&self, event_id: &str) -> Result<(), ExternalError>;
}
