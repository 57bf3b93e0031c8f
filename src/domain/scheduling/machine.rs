//! Pure transition function of the scheduling workflow.
//!
//! The first reply of a fresh booking always carries concrete slots: with no
//! stated preference the machine asks the calendar for the earliest times
//! from today instead of asking the patient to narrow things down.
//!
//! Selections are resolved against the list stored in the payload, the one
//! actually sent, never against a fresh calendar read. An id from an older
//! list, or one arriving after the booking finished, is answered as
//! "no longer valid" and never books anything.

use chrono::{FixedOffset, NaiveDate};

use super::preference::{SlotPreference, SlotQuery};
use super::slot::{Slot, SlotId};
use super::state::{BookedAppointment, SchedulingIntent, SchedulingPayload, SchedulingState};
use crate::domain::conversation::text::{is_affirmative, is_negative, ordinal};
use crate::domain::conversation::{ListRow, Reply, Transition, UserInput};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::domain::verification::PatientRecord;

pub const CONFIRM_ID: &str = "sched:confirm";
pub const CHANGE_ID: &str = "sched:change";
pub const CANCEL_CONFIRM_ID: &str = "sched:cancel-confirm";
pub const KEEP_ID: &str = "sched:keep";
const APPOINTMENT_PREFIX: &str = "appt:";

/// Read-only facts a scheduling step may consult.
#[derive(Debug, Clone, Copy)]
pub struct SchedulingEnv<'a> {
    pub now: Timestamp,
    pub offset: FixedOffset,
    pub slot_limit: usize,
    /// Appointments already booked by this user.
    pub appointments: &'a [BookedAppointment],
    pub human_contact: &'a str,
}

impl SchedulingEnv<'_> {
    pub fn today(&self) -> NaiveDate {
        self.now.date_in(self.offset)
    }
}

/// Inputs to the scheduling machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulingEvent {
    Start {
        intent: SchedulingIntent,
        service: Option<String>,
        patient: Option<PatientRecord>,
        input: Option<UserInput>,
    },
    Message(UserInput),
    SlotsFetched(Vec<Slot>),
    Booked { event_id: String },
    Rescheduled { event_id: String },
    Cancelled,
    /// The calendar refused the booking because the time is gone.
    SlotTaken,
}

/// Work the execution shell performs on the machine's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulingEffect {
    FetchSlots(SlotQuery),
    Book {
        slot: Slot,
        service: Option<String>,
        patient_name: Option<String>,
    },
    Reschedule { event_id: String, slot: Slot },
    Cancel { event_id: String },
    InvalidateAvailability,
    RecordAppointment(BookedAppointment),
    ForgetAppointment { event_id: String },
}

pub type SchedulingTransition = Transition<SchedulingState, SchedulingPayload, SchedulingEffect>;

/// Applies one event.
///
/// Errors are invariant faults: an event that cannot occur in the given
/// state, or a payload missing a field the state guarantees.
pub fn transition(
    state: SchedulingState,
    payload: SchedulingPayload,
    event: SchedulingEvent,
    env: &SchedulingEnv<'_>,
) -> Result<SchedulingTransition, DomainError> {
    use SchedulingState::*;

    match (state, event) {
        (
            _,
            SchedulingEvent::Start {
                intent,
                service,
                patient,
                input,
            },
        ) => Ok(start(intent, service, patient, input, env)),

        (Done, event) => Err(unexpected(state, &event)),

        (_, SchedulingEvent::SlotsFetched(slots)) => Ok(slots_fetched(state, payload, slots, env)),

        (OfferingSlots, SchedulingEvent::Message(input)) => Ok(offering_input(payload, &input, env)),
        (AwaitingConfirmation, SchedulingEvent::Message(input)) => {
            confirmation_input(payload, &input, env)
        }
        (Finalizing, SchedulingEvent::Message(_)) => Ok(Transition::to(Finalizing, payload)
            .reply(Reply::text("Estamos confirmando tu hora, dame un momento."))),
        (Cancelling, SchedulingEvent::Message(input)) => Ok(cancelling_input(payload, &input, env)),
        (Rescheduling, SchedulingEvent::Message(input)) => {
            Ok(rescheduling_input(payload, &input, env))
        }
        (CollectingPreferences, SchedulingEvent::Message(input)) => {
            let preference = SlotPreference::parse(&input.raw, env.today());
            Ok(fetch(CollectingPreferences, payload, preference, env))
        }

        (Finalizing, SchedulingEvent::Booked { event_id }) => booked(payload, event_id),
        (Finalizing, SchedulingEvent::Rescheduled { event_id }) => rescheduled(payload, event_id),
        (Finalizing, SchedulingEvent::SlotTaken) => {
            let mut payload = payload;
            payload.selected = None;
            payload.notice = Some(
                "Esa hora acaba de ser tomada. Estas son las horas disponibles ahora:".to_string(),
            );
            let preference = payload.preference;
            Ok(invalidate_then_fetch(Finalizing, payload, preference, env, None))
        }
        (Cancelling, SchedulingEvent::Cancelled) => cancelled(payload, env),

        (state, event) => Err(unexpected(state, &event)),
    }
}

fn unexpected(state: SchedulingState, event: &SchedulingEvent) -> DomainError {
    let event_name = match event {
        SchedulingEvent::Start { .. } => "start",
        SchedulingEvent::Message(_) => "message",
        SchedulingEvent::SlotsFetched(_) => "slots_fetched",
        SchedulingEvent::Booked { .. } => "booked",
        SchedulingEvent::Rescheduled { .. } => "rescheduled",
        SchedulingEvent::Cancelled => "cancelled",
        SchedulingEvent::SlotTaken => "slot_taken",
    };
    DomainError::new(
        ErrorCode::InvalidStateTransition,
        format!("scheduling cannot handle {} in {:?}", event_name, state),
    )
}

fn start(
    intent: SchedulingIntent,
    service: Option<String>,
    patient: Option<PatientRecord>,
    input: Option<UserInput>,
    env: &SchedulingEnv<'_>,
) -> SchedulingTransition {
    let mut payload = SchedulingPayload {
        intent,
        service,
        patient,
        ..SchedulingPayload::default()
    };
    let text = input.as_ref().map(|i| i.raw.as_str()).unwrap_or_default();

    match intent {
        SchedulingIntent::Book => {
            if SlotId::looks_like(text) || text == CONFIRM_ID {
                payload.notice = Some(
                    "Esa hora ya no es válida. Estas son las horas disponibles ahora:".to_string(),
                );
                return fetch(
                    SchedulingState::CollectingPreferences,
                    payload,
                    SlotPreference::earliest(),
                    env,
                );
            }
            let preference = SlotPreference::parse(text, env.today());
            fetch(SchedulingState::CollectingPreferences, payload, preference, env)
        }
        SchedulingIntent::Cancel => match env.appointments {
            [] => Transition::to(SchedulingState::Done, payload).reply(Reply::text(
                "No encontré horas agendadas a tu nombre. Si quieres reservar una, escribe \"agendar\".",
            )),
            [only] => {
                payload.target_event = Some(only.event_id.clone());
                Transition::to(SchedulingState::Cancelling, payload)
                    .reply(confirm_cancel_reply(only))
            }
            many => Transition::to(SchedulingState::Cancelling, payload)
                .reply(appointment_list_reply("¿Qué hora quieres cancelar?", many)),
        },
        SchedulingIntent::Reschedule => match env.appointments {
            [] => {
                payload.intent = SchedulingIntent::Book;
                payload.notice = Some(
                    "No encontré horas agendadas para cambiar, así que busquemos una nueva."
                        .to_string(),
                );
                let preference = SlotPreference::parse(text, env.today());
                fetch(SchedulingState::CollectingPreferences, payload, preference, env)
            }
            [only] => {
                payload.target_event = Some(only.event_id.clone());
                let preference = SlotPreference::parse(text, env.today());
                fetch(SchedulingState::Rescheduling, payload, preference, env)
            }
            many => Transition::to(SchedulingState::Rescheduling, payload)
                .reply(appointment_list_reply("¿Qué hora quieres cambiar?", many)),
        },
    }
}

fn fetch(
    state: SchedulingState,
    mut payload: SchedulingPayload,
    preference: SlotPreference,
    env: &SchedulingEnv<'_>,
) -> SchedulingTransition {
    payload.preference = preference;
    let query = SlotQuery::new(preference, env.today(), env.slot_limit);
    Transition::to(state, payload).effect(SchedulingEffect::FetchSlots(query))
}

fn slots_fetched(
    state: SchedulingState,
    mut payload: SchedulingPayload,
    slots: Vec<Slot>,
    env: &SchedulingEnv<'_>,
) -> SchedulingTransition {
    if slots.is_empty() {
        if !payload.widened && !payload.preference.is_empty() {
            payload.widened = true;
            let asked = payload.preference.describe();
            let notice = format!(
                "No encontré horas {}. Te muestro las más próximas:",
                asked
            );
            payload.notice = Some(match payload.notice.take() {
                Some(previous) => format!("{}\n\n{}", previous, notice),
                None => notice,
            });
            return fetch(state, payload, SlotPreference::earliest(), env);
        }
        let notice = payload.notice.take().unwrap_or_default();
        let reply = Reply::text(format!(
            "Por ahora no tengo horas disponibles en los próximos días. Escríbenos a {} y te ayudamos a encontrar una.",
            env.human_contact
        ))
        .prefixed(&notice);
        return Transition::to(SchedulingState::Done, payload).reply(reply);
    }

    payload.offered = slots;
    payload.offer_issued_at = Some(env.now);
    payload.selected = None;
    payload.widened = false;
    let notice = payload.notice.take().unwrap_or_default();
    let reply = offer_reply(&payload).prefixed(&notice);
    Transition::to(SchedulingState::OfferingSlots, payload).reply(reply)
}

fn offer_reply(payload: &SchedulingPayload) -> Reply {
    let issued = payload.offer_issued_at.unwrap_or_default();
    let mut text = match (&payload.intent, &payload.service) {
        (SchedulingIntent::Reschedule, _) => "Estas son las horas disponibles para tu cambio:".to_string(),
        (_, Some(service)) => format!("Estas son las horas disponibles para {}:", service),
        _ => "Estas son las horas disponibles:".to_string(),
    };
    for (i, slot) in payload.offered.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, slot.long_label));
    }
    text.push_str("\n\nElige una, o dime otro día u horario.");
    let rows = payload
        .offered
        .iter()
        .map(|slot| {
            ListRow::new(slot.id(issued).to_string(), &slot.short_label)
                .with_description(&slot.long_label)
        })
        .collect();
    Reply::text(text).with_list("Horas disponibles", rows)
}

fn confirm_reply(payload: &SchedulingPayload, slot: &Slot) -> Reply {
    let question = match payload.intent {
        SchedulingIntent::Reschedule => format!("¿Cambiamos tu hora al {}?", slot.long_label),
        _ => format!("¿Confirmas tu hora para el {}?", slot.long_label),
    };
    Reply::text(question).with_buttons(vec![(CONFIRM_ID, "Confirmar"), (CHANGE_ID, "Elegir otra")])
}

fn confirm_cancel_reply(appointment: &BookedAppointment) -> Reply {
    Reply::text(format!(
        "¿Confirmas que quieres cancelar tu hora del {}?",
        appointment.slot.long_label
    ))
    .with_buttons(vec![(CANCEL_CONFIRM_ID, "Sí, cancelar"), (KEEP_ID, "No, mantener")])
}

fn appointment_list_reply(question: &str, appointments: &[BookedAppointment]) -> Reply {
    let mut text = question.to_string();
    for (i, appointment) in appointments.iter().enumerate() {
        text.push_str(&format!("\n{}. {}", i + 1, appointment.slot.long_label));
    }
    let rows = appointments
        .iter()
        .map(|a| {
            ListRow::new(format!("{}{}", APPOINTMENT_PREFIX, a.event_id), &a.slot.short_label)
                .with_description(&a.slot.long_label)
        })
        .collect();
    Reply::text(text).with_list("Tus horas", rows)
}

/// Resolves a selection against the list that was sent.
fn resolve_selection(payload: &SchedulingPayload, input: &UserInput, offset: FixedOffset) -> Selection {
    if SlotId::looks_like(&input.raw) {
        let Ok(id) = SlotId::parse(&input.raw) else {
            return Selection::Stale;
        };
        let Some(issued) = payload.offer_issued_at else {
            return Selection::Stale;
        };
        if !id.issued_with(issued) {
            return Selection::Stale;
        }
        return match id.key(offset) {
            Some(key) => payload
                .offered
                .iter()
                .find(|slot| slot.key() == key)
                .cloned()
                .map_or(Selection::Stale, Selection::Slot),
            None => Selection::Stale,
        };
    }
    match ordinal(&input.normalized) {
        Some(n) if n <= payload.offered.len() => Selection::Slot(payload.offered[n - 1].clone()),
        _ => Selection::None,
    }
}

enum Selection {
    Slot(Slot),
    Stale,
    None,
}

fn offering_input(
    mut payload: SchedulingPayload,
    input: &UserInput,
    env: &SchedulingEnv<'_>,
) -> SchedulingTransition {
    match resolve_selection(&payload, input, env.offset) {
        Selection::Slot(slot) => return select(payload, slot),
        Selection::Stale => return stale(payload),
        Selection::None => {}
    }
    let preference = SlotPreference::parse(&input.raw, env.today());
    if !preference.is_empty() {
        payload.widened = false;
        return fetch(SchedulingState::OfferingSlots, payload, preference, env);
    }
    let hint = if is_negative(&input.normalized) {
        "Sin problema. Dime qué día u horario te acomoda, o elige una de estas:"
    } else {
        "No logré identificar la hora. Elige una de la lista, o dime otro día u horario."
    };
    let reply = offer_reply(&payload).prefixed(hint);
    Transition::to(SchedulingState::OfferingSlots, payload).reply(reply)
}

fn select(mut payload: SchedulingPayload, slot: Slot) -> SchedulingTransition {
    let reply = confirm_reply(&payload, &slot);
    payload.selected = Some(slot);
    Transition::to(SchedulingState::AwaitingConfirmation, payload).reply(reply)
}

fn stale(mut payload: SchedulingPayload) -> SchedulingTransition {
    payload.selected = None;
    let reply = offer_reply(&payload)
        .prefixed("Esa hora ya no es válida. Elige una de la lista más reciente:");
    Transition::to(SchedulingState::OfferingSlots, payload).reply(reply)
}

fn confirmation_input(
    mut payload: SchedulingPayload,
    input: &UserInput,
    env: &SchedulingEnv<'_>,
) -> Result<SchedulingTransition, DomainError> {
    if input.raw == CONFIRM_ID || (!input.is_selection() && is_affirmative(&input.normalized)) {
        let slot = payload
            .selected
            .clone()
            .ok_or_else(|| DomainError::missing_field("scheduling", "selected"))?;
        let effect = match (payload.intent, payload.target_event.clone()) {
            (SchedulingIntent::Reschedule, Some(event_id)) => {
                SchedulingEffect::Reschedule { event_id, slot }
            }
            _ => SchedulingEffect::Book {
                slot,
                service: payload.service.clone(),
                patient_name: payload
                    .patient
                    .as_ref()
                    .map(|p| p.name.clone())
                    .filter(|n| !n.is_empty()),
            },
        };
        return Ok(Transition::to(SchedulingState::Finalizing, payload).effect(effect));
    }
    if input.raw == CHANGE_ID || is_negative(&input.normalized) {
        payload.selected = None;
        let reply = offer_reply(&payload).prefixed("Sin problema, elige otra:");
        return Ok(Transition::to(SchedulingState::OfferingSlots, payload).reply(reply));
    }
    match resolve_selection(&payload, input, env.offset) {
        Selection::Slot(slot) => return Ok(select(payload, slot)),
        Selection::Stale => return Ok(stale(payload)),
        Selection::None => {}
    }
    let preference = SlotPreference::parse(&input.raw, env.today());
    if !preference.is_empty() {
        payload.selected = None;
        payload.widened = false;
        return Ok(fetch(SchedulingState::AwaitingConfirmation, payload, preference, env));
    }
    let slot = payload
        .selected
        .clone()
        .ok_or_else(|| DomainError::missing_field("scheduling", "selected"))?;
    let reply = confirm_reply(&payload, &slot);
    Ok(Transition::to(SchedulingState::AwaitingConfirmation, payload).reply(reply))
}

fn booked(mut payload: SchedulingPayload, event_id: String) -> Result<SchedulingTransition, DomainError> {
    let slot = payload
        .selected
        .clone()
        .ok_or_else(|| DomainError::missing_field("scheduling", "selected"))?;
    let appointment = BookedAppointment {
        event_id: event_id.clone(),
        slot: slot.clone(),
        service: payload.service.clone(),
    };
    payload.booked_event = Some(event_id);
    let reply = Reply::text(format!(
        "¡Listo! Tu hora quedó agendada para el {}. Te esperamos.",
        slot.long_label
    ));
    Ok(Transition::to(SchedulingState::Done, payload)
        .reply(reply)
        .effect(SchedulingEffect::InvalidateAvailability)
        .effect(SchedulingEffect::RecordAppointment(appointment)))
}

fn rescheduled(
    mut payload: SchedulingPayload,
    event_id: String,
) -> Result<SchedulingTransition, DomainError> {
    let slot = payload
        .selected
        .clone()
        .ok_or_else(|| DomainError::missing_field("scheduling", "selected"))?;
    let previous = payload
        .target_event
        .take()
        .ok_or_else(|| DomainError::missing_field("scheduling", "target_event"))?;
    let appointment = BookedAppointment {
        event_id: event_id.clone(),
        slot: slot.clone(),
        service: payload.service.clone(),
    };
    payload.booked_event = Some(event_id);
    let reply = Reply::text(format!("Listo, tu hora quedó cambiada al {}.", slot.long_label));
    Ok(Transition::to(SchedulingState::Done, payload)
        .reply(reply)
        .effect(SchedulingEffect::InvalidateAvailability)
        .effect(SchedulingEffect::ForgetAppointment { event_id: previous })
        .effect(SchedulingEffect::RecordAppointment(appointment)))
}

fn pick_appointment<'a>(
    input: &UserInput,
    appointments: &'a [BookedAppointment],
) -> Option<&'a BookedAppointment> {
    if let Some(id) = input.raw.strip_prefix(APPOINTMENT_PREFIX) {
        return appointments.iter().find(|a| a.event_id == id);
    }
    ordinal(&input.normalized).and_then(|n| appointments.get(n - 1))
}

fn cancelling_input(
    mut payload: SchedulingPayload,
    input: &UserInput,
    env: &SchedulingEnv<'_>,
) -> SchedulingTransition {
    let Some(target) = payload.target_event.clone() else {
        return match pick_appointment(input, env.appointments) {
            Some(appointment) => {
                payload.target_event = Some(appointment.event_id.clone());
                Transition::to(SchedulingState::Cancelling, payload)
                    .reply(confirm_cancel_reply(appointment))
            }
            None => Transition::to(SchedulingState::Cancelling, payload).reply(
                appointment_list_reply("No identifiqué la hora. ¿Cuál quieres cancelar?", env.appointments),
            ),
        };
    };
    if input.raw == CANCEL_CONFIRM_ID || (!input.is_selection() && is_affirmative(&input.normalized)) {
        return Transition::to(SchedulingState::Cancelling, payload)
            .effect(SchedulingEffect::Cancel { event_id: target });
    }
    if input.raw == KEEP_ID || is_negative(&input.normalized) {
        payload.target_event = None;
        return Transition::to(SchedulingState::Done, payload)
            .reply(Reply::text("Perfecto, tu hora se mantiene."));
    }
    let reply = env
        .appointments
        .iter()
        .find(|a| a.event_id == target)
        .map(confirm_cancel_reply)
        .unwrap_or_else(|| Reply::text("¿Confirmas la cancelación?").with_buttons(vec![
            (CANCEL_CONFIRM_ID, "Sí, cancelar"),
            (KEEP_ID, "No, mantener"),
        ]));
    Transition::to(SchedulingState::Cancelling, payload).reply(reply)
}

fn cancelled(
    mut payload: SchedulingPayload,
    env: &SchedulingEnv<'_>,
) -> Result<SchedulingTransition, DomainError> {
    let event_id = payload
        .target_event
        .take()
        .ok_or_else(|| DomainError::missing_field("scheduling", "target_event"))?;
    payload.intent = SchedulingIntent::Book;
    payload.notice =
        Some("Tu hora fue cancelada. Si quieres, puedes elegir una nueva:".to_string());
    Ok(invalidate_then_fetch(
        SchedulingState::Cancelling,
        payload,
        SlotPreference::earliest(),
        env,
        Some(event_id),
    ))
}

/// Drops cached availability (and optionally a recorded appointment)
/// before searching again, so the new list reflects the change.
fn invalidate_then_fetch(
    state: SchedulingState,
    payload: SchedulingPayload,
    preference: SlotPreference,
    env: &SchedulingEnv<'_>,
    forget: Option<String>,
) -> SchedulingTransition {
    let fetched = fetch(state, payload, preference, env);
    let mut effects = vec![SchedulingEffect::InvalidateAvailability];
    if let Some(event_id) = forget {
        effects.push(SchedulingEffect::ForgetAppointment { event_id });
    }
    effects.extend(fetched.effects);
    Transition {
        effects,
        ..Transition::to(fetched.state, fetched.payload)
    }
}

fn rescheduling_input(
    mut payload: SchedulingPayload,
    input: &UserInput,
    env: &SchedulingEnv<'_>,
) -> SchedulingTransition {
    match pick_appointment(input, env.appointments) {
        Some(appointment) => {
            payload.target_event = Some(appointment.event_id.clone());
            fetch(SchedulingState::Rescheduling, payload, SlotPreference::earliest(), env)
        }
        None => Transition::to(SchedulingState::Rescheduling, payload).reply(
            appointment_list_reply("No identifiqué la hora. ¿Cuál quieres cambiar?", env.appointments),
        ),
    }
}

/// Re-renders the prompt of the current state, used when a suspended
/// workflow is resumed.
pub fn prompt(state: SchedulingState, payload: &SchedulingPayload, env: &SchedulingEnv<'_>) -> Reply {
    match state {
        SchedulingState::OfferingSlots => offer_reply(payload),
        SchedulingState::AwaitingConfirmation => match &payload.selected {
            Some(slot) => confirm_reply(payload, slot),
            None => offer_reply(payload),
        },
        SchedulingState::Cancelling => {
            match payload
                .target_event
                .as_ref()
                .and_then(|id| env.appointments.iter().find(|a| &a.event_id == id))
            {
                Some(appointment) => confirm_cancel_reply(appointment),
                None => appointment_list_reply("¿Qué hora quieres cancelar?", env.appointments),
            }
        }
        SchedulingState::Rescheduling => {
            appointment_list_reply("¿Qué hora quieres cambiar?", env.appointments)
        }
        SchedulingState::Finalizing => {
            Reply::text("Estamos confirmando tu hora, dame un momento.")
        }
        SchedulingState::CollectingPreferences => {
            Reply::text("¿Para qué día y horario quieres tu hora?")
        }
        SchedulingState::Done => Reply::text("Tu solicitud de hora ya está completa."),
    }
}

/// Whether `input` is something the current state can act on. Questions
/// the state cannot act on are treated as interruptions by the router.
pub fn understands(
    state: SchedulingState,
    payload: &SchedulingPayload,
    input: &UserInput,
    today: NaiveDate,
) -> bool {
    if input.is_selection() {
        return true;
    }
    let yes_no = is_affirmative(&input.normalized) || is_negative(&input.normalized);
    match state {
        SchedulingState::OfferingSlots | SchedulingState::AwaitingConfirmation => {
            yes_no
                || SlotId::looks_like(&input.raw)
                || ordinal(&input.normalized).is_some_and(|n| n <= payload.offered.len())
                || !SlotPreference::parse(&input.raw, today).is_empty()
        }
        SchedulingState::Cancelling | SchedulingState::Rescheduling => {
            yes_no || ordinal(&input.normalized).is_some()
        }
        SchedulingState::CollectingPreferences => {
            !SlotPreference::parse(&input.raw, today).is_empty()
        }
        SchedulingState::Finalizing | SchedulingState::Done => false,
    }
}
