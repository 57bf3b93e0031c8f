//! Scheduling shell: calendar calls, availability cache and appointment
//! bookkeeping around the scheduling machine.

use std::sync::Arc;

use super::{combine, runaway, StepOutcome, WorkflowError, WorkflowSettings, MAX_CHAINED_EVENTS};
use crate::application::availability_cache::AvailabilityCache;
use crate::application::retry::{with_retry, RetryPolicy};
use crate::domain::conversation::{ConversationContext, Flow, UserInput};
use crate::domain::foundation::{DomainError, ErrorCode, StateMachine, Timestamp, UserId};
use crate::domain::scheduling::machine::{self, SchedulingEffect, SchedulingEvent};
use crate::domain::scheduling::{
    BookedAppointment, SchedulingIntent, SchedulingPayload, SchedulingState, Slot, SlotQuery,
};
use crate::domain::verification::PatientRecord;
use crate::ports::{CalendarProvider, ExternalError, NewEvent};

pub struct SchedulingWorkflow {
    calendar: Arc<dyn CalendarProvider>,
    cache: Arc<AvailabilityCache>,
    settings: Arc<WorkflowSettings>,
    retry: RetryPolicy,
}

impl SchedulingWorkflow {
    pub fn new(
        calendar: Arc<dyn CalendarProvider>,
        cache: Arc<AvailabilityCache>,
        settings: Arc<WorkflowSettings>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            calendar,
            cache,
            settings,
            retry,
        }
    }

    /// Enters scheduling, replacing whatever flow is active.
    pub async fn start(
        &self,
        ctx: &mut ConversationContext,
        intent: SchedulingIntent,
        service: Option<String>,
        patient: Option<PatientRecord>,
        input: Option<UserInput>,
    ) -> Result<StepOutcome, WorkflowError> {
        let event = SchedulingEvent::Start {
            intent,
            service,
            patient,
            input,
        };
        self.run(ctx, SchedulingState::default(), SchedulingPayload::default(), event)
            .await
    }

    /// Feeds a message to the active scheduling flow.
    pub async fn step(
        &self,
        ctx: &mut ConversationContext,
        input: UserInput,
    ) -> Result<StepOutcome, WorkflowError> {
        let (state, payload) = match &ctx.flow {
            Flow::Scheduling { state, payload } => (*state, payload.clone()),
            other => {
                return Err(DomainError::new(
                    ErrorCode::InvalidStateTransition,
                    format!("scheduling step with {} active", other.workflow()),
                )
                .into())
            }
        };
        self.run(ctx, state, payload, SchedulingEvent::Message(input)).await
    }

    async fn run(
        &self,
        ctx: &mut ConversationContext,
        mut state: SchedulingState,
        mut payload: SchedulingPayload,
        first: SchedulingEvent,
    ) -> Result<StepOutcome, WorkflowError> {
        let now = Timestamp::now();
        let appointments = ctx.appointments.clone();
        let mut replies = Vec::new();
        let mut next = Some(first);
        let mut chained = 0;

        while let Some(event) = next.take() {
            chained += 1;
            if chained > MAX_CHAINED_EVENTS {
                return Err(runaway("scheduling").into());
            }
            let env = self.settings.scheduling_env(&appointments, now);
            let transition = machine::transition(state, payload, event, &env)?;
            tracing::debug!(
                user_id = %ctx.user_id,
                from = state.name(),
                to = transition.state.name(),
                "scheduling transition"
            );
            state = transition.state;
            payload = transition.payload;
            replies.extend(transition.reply);

            for effect in transition.effects {
                if let Some(event) = self.perform(ctx, effect, now).await? {
                    next = Some(event);
                }
            }
        }

        ctx.flow = Flow::Scheduling { state, payload };
        Ok(StepOutcome::reply(combine(replies)))
    }

    /// Carries out one effect, returning the event it produced, if any.
    async fn perform(
        &self,
        ctx: &mut ConversationContext,
        effect: SchedulingEffect,
        now: Timestamp,
    ) -> Result<Option<SchedulingEvent>, WorkflowError> {
        let event = match effect {
            SchedulingEffect::FetchSlots(query) => {
                let slots = self.fetch_slots(&ctx.user_id, query, now).await?;
                Some(SchedulingEvent::SlotsFetched(slots))
            }
            SchedulingEffect::Book {
                slot,
                service,
                patient_name,
            } => {
                let new_event = NewEvent::new(
                    ctx.user_id.clone(),
                    slot.start,
                    self.event_title(service.as_deref()),
                    patient_name,
                );
                let created = with_retry(&self.retry, "calendar.create_event", || {
                    self.calendar.create_event(new_event.clone())
                })
                .await;
                match created {
                    Ok(event_id) => {
                        tracing::info!(user_id = %ctx.user_id, event_id = %event_id, "appointment booked");
                        Some(SchedulingEvent::Booked { event_id })
                    }
                    Err(ExternalError::Conflict(reason)) => {
                        tracing::info!(user_id = %ctx.user_id, reason = %reason, "slot taken at booking");
                        Some(SchedulingEvent::SlotTaken)
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            SchedulingEffect::Reschedule { event_id, slot } => {
                let moved = with_retry(&self.retry, "calendar.reschedule_event", || {
                    self.calendar.reschedule_event(&event_id, slot.start)
                })
                .await;
                match moved {
                    Ok(event_id) => Some(SchedulingEvent::Rescheduled { event_id }),
                    Err(ExternalError::Conflict(_)) => Some(SchedulingEvent::SlotTaken),
                    Err(err) => return Err(err.into()),
                }
            }
            SchedulingEffect::Cancel { event_id } => {
                let cancelled = with_retry(&self.retry, "calendar.cancel_event", || {
                    self.calendar.cancel_event(&event_id)
                })
                .await;
                match cancelled {
                    // already gone is as good as cancelled
                    Ok(()) | Err(ExternalError::NotFound(_)) => {
                        tracing::info!(user_id = %ctx.user_id, event_id = %event_id, "appointment cancelled");
                        Some(SchedulingEvent::Cancelled)
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            SchedulingEffect::InvalidateAvailability => {
                self.cache.invalidate_user(&ctx.user_id).await;
                None
            }
            SchedulingEffect::RecordAppointment(appointment) => {
                record(&mut ctx.appointments, appointment);
                None
            }
            SchedulingEffect::ForgetAppointment { event_id } => {
                ctx.appointments.retain(|a| a.event_id != event_id);
                None
            }
        };
        Ok(event)
    }

    async fn fetch_slots(
        &self,
        user_id: &UserId,
        query: SlotQuery,
        now: Timestamp,
    ) -> Result<Vec<Slot>, ExternalError> {
        let offset = self.settings.offset;
        let (start, end) = query.window(self.settings.search_days);
        self.cache
            .get_or_fetch(user_id, query, || async move {
                let candidates = with_retry(&self.retry, "calendar.list_available", || {
                    self.calendar.list_available(start, end)
                })
                .await?;
                let local = candidates
                    .into_iter()
                    .map(|start| start.with_timezone(&offset))
                    .collect();
                Ok(query.select(local, now.in_offset(offset)))
            })
            .await
    }

    fn event_title(&self, service: Option<&str>) -> String {
        match service.and_then(|code| self.settings.catalog.service_by_code(code)) {
            Some(service) => service.name.clone(),
            None => "Hora agendada".to_string(),
        }
    }
}

fn record(appointments: &mut Vec<BookedAppointment>, appointment: BookedAppointment) {
    appointments.retain(|a| a.event_id != appointment.event_id);
    appointments.push(appointment);
    appointments.sort_by_key(|a| a.slot.start);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::calendar::InMemoryCalendar;
    use crate::domain::decision::ServiceCatalog;
    use crate::domain::scheduling::machine::CONFIRM_ID;
    use async_trait::async_trait;
    use chrono::{DateTime, FixedOffset, NaiveDate};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Calendar that applies every write but acknowledges the first one late.
    struct SlowAckCalendar {
        inner: InMemoryCalendar,
        writes: AtomicU32,
        delay: Duration,
    }

    impl SlowAckCalendar {
        fn new(delay: Duration) -> Self {
            Self {
                inner: InMemoryCalendar::new(settings().offset),
                writes: AtomicU32::new(0),
                delay,
            }
        }

        async fn ack(&self) {
            if self.writes.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                tokio::time::sleep(self.delay).await;
            }
        }
    }

    #[async_trait]
    impl CalendarProvider for SlowAckCalendar {
        async fn list_available(
            &self,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<DateTime<FixedOffset>>, ExternalError> {
            self.inner.list_available(start, end).await
        }

        async fn create_event(&self, event: NewEvent) -> Result<String, ExternalError> {
            let created = self.inner.create_event(event).await;
            self.ack().await;
            created
        }

        async fn reschedule_event(
            &self,
            event_id: &str,
            start: DateTime<FixedOffset>,
        ) -> Result<String, ExternalError> {
            let moved = self.inner.reschedule_event(event_id, start).await;
            self.ack().await;
            moved
        }

        async fn cancel_event(&self, event_id: &str) -> Result<(), ExternalError> {
            self.inner.cancel_event(event_id).await
        }
    }

    fn retrying() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(10),
            multiplier: 2,
            max_delay: Duration::from_millis(50),
            attempt_timeout: Duration::from_millis(100),
        }
    }

    fn settings() -> Arc<WorkflowSettings> {
        Arc::new(WorkflowSettings {
            catalog: Arc::new(ServiceCatalog::embedded().unwrap()),
            offset: FixedOffset::west_opt(3 * 3600).unwrap(),
            slot_limit: 5,
            search_days: 14,
            human_contact: "+56 2 2345 6789".to_string(),
        })
    }

    fn workflow(calendar: Arc<InMemoryCalendar>) -> SchedulingWorkflow {
        SchedulingWorkflow::new(
            calendar,
            Arc::new(AvailabilityCache::new(Duration::from_secs(60))),
            settings(),
            RetryPolicy::no_retry(Duration::from_secs(2)),
        )
    }

    fn context() -> ConversationContext {
        ConversationContext::new(UserId::new("+56911112222").unwrap())
    }

    #[tokio::test]
    async fn fresh_booking_offers_slots_immediately() {
        let calendar = Arc::new(InMemoryCalendar::new(settings().offset));
        let shell = workflow(calendar);
        let mut ctx = context();

        let outcome = shell
            .start(&mut ctx, SchedulingIntent::Book, None, None, None)
            .await
            .unwrap();

        assert!(matches!(
            ctx.flow,
            Flow::Scheduling {
                state: SchedulingState::OfferingSlots,
                ..
            }
        ));
        assert!(outcome.reply.interactive.is_some());
        assert!(outcome.handoff.is_none());
    }

    #[tokio::test]
    async fn select_and_confirm_books_once() {
        let calendar = Arc::new(InMemoryCalendar::new(settings().offset));
        let shell = workflow(calendar.clone());
        let mut ctx = context();

        shell
            .start(&mut ctx, SchedulingIntent::Book, None, None, None)
            .await
            .unwrap();
        shell.step(&mut ctx, UserInput::text("1")).await.unwrap();
        let done = shell
            .step(&mut ctx, UserInput::selection(CONFIRM_ID))
            .await
            .unwrap();

        assert!(done.reply.text.contains("agendada"));
        assert_eq!(ctx.appointments.len(), 1);
        assert_eq!(calendar.booked_count().await, 1);
        assert!(ctx.flow.is_terminal());
    }

    #[tokio::test]
    async fn step_without_scheduling_flow_is_an_invariant_fault() {
        let calendar = Arc::new(InMemoryCalendar::new(settings().offset));
        let shell = workflow(calendar);
        let mut ctx = context();
        let err = shell.step(&mut ctx, UserInput::text("1")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Invariant(_)));
    }

    #[tokio::test]
    async fn calendar_outage_is_transient() {
        let calendar = Arc::new(InMemoryCalendar::new(settings().offset));
        calendar.set_unavailable(true);
        let shell = workflow(calendar);
        let mut ctx = context();
        let err = shell
            .start(&mut ctx, SchedulingIntent::Book, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Transient(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn late_booking_ack_still_records_one_appointment() {
        let calendar = Arc::new(SlowAckCalendar::new(Duration::from_millis(500)));
        let shell = SchedulingWorkflow::new(
            calendar.clone(),
            Arc::new(AvailabilityCache::new(Duration::from_secs(60))),
            settings(),
            retrying(),
        );
        let mut ctx = context();

        shell
            .start(&mut ctx, SchedulingIntent::Book, None, None, None)
            .await
            .unwrap();
        shell.step(&mut ctx, UserInput::text("1")).await.unwrap();
        let done = shell
            .step(&mut ctx, UserInput::selection(CONFIRM_ID))
            .await
            .unwrap();

        assert!(calendar.writes.load(Ordering::SeqCst) >= 2);
        assert_eq!(calendar.inner.booked_count().await, 1);
        assert_eq!(ctx.appointments.len(), 1);
        let booked = calendar.inner.events_for(&ctx.user_id).await;
        assert_eq!(booked[0].0, ctx.appointments[0].event_id);
        assert!(done.reply.text.contains("agendada"));
    }

    #[tokio::test(start_paused = true)]
    async fn late_reschedule_ack_moves_the_appointment() {
        let calendar = Arc::new(SlowAckCalendar::new(Duration::from_millis(500)));
        let shell = SchedulingWorkflow::new(
            calendar.clone(),
            Arc::new(AvailabilityCache::new(Duration::from_secs(60))),
            settings(),
            retrying(),
        );
        let mut ctx = context();
        shell
            .start(&mut ctx, SchedulingIntent::Book, None, None, None)
            .await
            .unwrap();
        shell.step(&mut ctx, UserInput::text("1")).await.unwrap();
        shell
            .step(&mut ctx, UserInput::selection(CONFIRM_ID))
            .await
            .unwrap();
        let before = ctx.appointments[0].clone();

        shell
            .start(&mut ctx, SchedulingIntent::Reschedule, None, None, None)
            .await
            .unwrap();
        shell.step(&mut ctx, UserInput::text("1")).await.unwrap();
        shell
            .step(&mut ctx, UserInput::selection(CONFIRM_ID))
            .await
            .unwrap();

        assert_eq!(ctx.appointments.len(), 1);
        assert_eq!(ctx.appointments[0].event_id, before.event_id);
        assert_ne!(ctx.appointments[0].slot.start, before.slot.start);
        let booked = calendar.inner.events_for(&ctx.user_id).await;
        assert_eq!(booked, vec![(before.event_id.clone(), ctx.appointments[0].slot.start)]);
    }
}
