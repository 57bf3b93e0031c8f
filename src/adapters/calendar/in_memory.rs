//! In-memory calendar.
//!
//! Availability is the clinic's working-hours grid minus booked starts.
//! Useful for tests, demos and single-node deployments without a calendar
//! service.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Weekday};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::foundation::UserId;
use crate::ports::{CalendarProvider, ExternalError, NewEvent};

/// Opening blocks per weekday and the length of one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingHours {
    /// `[open, close)` blocks, by weekday. Missing days are closed.
    pub blocks: HashMap<Weekday, Vec<(NaiveTime, NaiveTime)>>,
    pub slot_minutes: i64,
}

impl Default for WorkingHours {
    /// Weekdays 09:00-13:00 and 14:00-18:00, Saturday mornings, 30 minute slots.
    fn default() -> Self {
        let at = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN);
        let weekday = vec![(at(9), at(13)), (at(14), at(18))];
        let mut blocks = HashMap::new();
        for day in [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ] {
            blocks.insert(day, weekday.clone());
        }
        blocks.insert(Weekday::Sat, vec![(at(9), at(13))]);
        Self {
            blocks,
            slot_minutes: 30,
        }
    }
}

impl WorkingHours {
    /// Slot starts on `date`, in order.
    fn starts_on(&self, date: NaiveDate) -> Vec<NaiveTime> {
        let step = Duration::minutes(self.slot_minutes.max(1));
        let mut starts = Vec::new();
        for (open, close) in self.blocks.get(&date.weekday()).into_iter().flatten() {
            let mut t = *open;
            while t + step <= *close {
                starts.push(t);
                t += step;
            }
        }
        starts
    }

    fn is_slot(&self, start: DateTime<FixedOffset>) -> bool {
        self.starts_on(start.date_naive()).contains(&start.time())
    }
}

#[derive(Debug, Clone)]
struct Booking {
    user_id: UserId,
    start: DateTime<FixedOffset>,
    title: String,
    idempotency_key: String,
}

/// In-memory calendar provider.
#[derive(Debug, Clone)]
pub struct InMemoryCalendar {
    offset: FixedOffset,
    hours: WorkingHours,
    bookings: Arc<RwLock<HashMap<String, Booking>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self::with_hours(offset, WorkingHours::default())
    }

    pub fn with_hours(offset: FixedOffset, hours: WorkingHours) -> Self {
        Self {
            offset,
            hours,
            bookings: Arc::new(RwLock::new(HashMap::new())),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every call fail with a retryable error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn booked_count(&self) -> usize {
        self.bookings.read().await.len()
    }

    /// Event ids booked for a user, by start time.
    pub async fn events_for(&self, user_id: &UserId) -> Vec<(String, DateTime<FixedOffset>)> {
        let bookings = self.bookings.read().await;
        let mut events: Vec<_> = bookings
            .iter()
            .filter(|(_, b)| &b.user_id == user_id)
            .map(|(id, b)| (id.clone(), b.start))
            .collect();
        events.sort_by_key(|(_, start)| *start);
        events
    }

    fn check_available(&self) -> Result<(), ExternalError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ExternalError::server(503, "calendar unavailable"));
        }
        Ok(())
    }

    fn local(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<FixedOffset>> {
        self.offset
            .from_local_datetime(&date.and_time(time))
            .single()
    }

    fn validate_start(&self, start: DateTime<FixedOffset>) -> Result<DateTime<FixedOffset>, ExternalError> {
        let local = start.with_timezone(&self.offset);
        if !self.hours.is_slot(local) {
            return Err(ExternalError::InvalidRequest(format!(
                "{} is not a bookable slot",
                local
            )));
        }
        Ok(local)
    }
}

fn taken(bookings: &HashMap<String, Booking>, start: DateTime<FixedOffset>, except: Option<&str>) -> bool {
    bookings
        .iter()
        .any(|(id, b)| b.start == start && Some(id.as_str()) != except)
}

#[async_trait]
impl CalendarProvider for InMemoryCalendar {
    async fn list_available(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DateTime<FixedOffset>>, ExternalError> {
        self.check_available()?;
        let bookings = self.bookings.read().await;
        let mut free = Vec::new();
        let mut date = start;
        while date < end {
            for time in self.hours.starts_on(date) {
                if let Some(slot) = self.local(date, time) {
                    if !taken(&bookings, slot, None) {
                        free.push(slot);
                    }
                }
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        Ok(free)
    }

    async fn create_event(&self, event: NewEvent) -> Result<String, ExternalError> {
        self.check_available()?;
        let start = self.validate_start(event.start)?;
        let mut bookings = self.bookings.write().await;
        if let Some((id, _)) = bookings
            .iter()
            .find(|(_, b)| b.idempotency_key == event.idempotency_key && b.start == start)
        {
            return Ok(id.clone());
        }
        if taken(&bookings, start, None) {
            return Err(ExternalError::Conflict(format!("{} is already booked", start)));
        }
        let event_id = format!("evt_{}", Uuid::new_v4().simple());
        let title = match event.patient_name {
            Some(name) => format!("{} - {}", event.title, name),
            None => event.title,
        };
        bookings.insert(
            event_id.clone(),
            Booking {
                user_id: event.user_id,
                start,
                title,
                idempotency_key: event.idempotency_key,
            },
        );
        Ok(event_id)
    }

    async fn reschedule_event(
        &self,
        event_id: &str,
        start: DateTime<FixedOffset>,
    ) -> Result<String, ExternalError> {
        self.check_available()?;
        let start = self.validate_start(start)?;
        let mut bookings = self.bookings.write().await;
        if !bookings.contains_key(event_id) {
            return Err(ExternalError::NotFound(event_id.to_string()));
        }
        if taken(&bookings, start, Some(event_id)) {
            return Err(ExternalError::Conflict(format!("{} is already booked", start)));
        }
        if let Some(booking) = bookings.get_mut(event_id) {
            booking.start = start;
        }
        Ok(event_id.to_string())
    }

    async fn cancel_event(&self, event_id: &str) -> Result<(), ExternalError> {
        self.check_available()?;
        match self.bookings.write().await.remove(event_id) {
            Some(booking) => {
                tracing::debug!(event_id, title = %booking.title, "calendar event removed");
                Ok(())
            }
            None => Err(ExternalError::NotFound(event_id.to_string())),
        }
    }
}
