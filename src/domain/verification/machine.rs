//! Pure transition function of the verification workflow.
//!
//! Identifies the service and the patient, fetches the record from the
//! registry or walks the patient through the fields one at a time, asks for
//! confirmation and then runs the decision engine. A verdict that continues
//! into scheduling ends the workflow with a handoff effect.

use chrono::NaiveDate;

use super::patient::{parse_patient_id, PatientField, PatientRecord};
use super::state::{PatientSource, VerificationPayload, VerificationState};
use crate::domain::conversation::text::{contains_any, is_affirmative, is_negative};
use crate::domain::conversation::{Reply, Transition, UserInput};
use crate::domain::decision::{decide, NextAction, ServiceCatalog};
use crate::domain::foundation::{DomainError, ErrorCode, StateMachine};

pub const NEW_PATIENT_ID: &str = "verify:new";
pub const DATA_OK_ID: &str = "verify:ok";
pub const DATA_FIX_ID: &str = "verify:fix";

const NEW_PATIENT_WORDS: &[&str] = &["nuevo", "nueva", "primera vez", "no soy paciente"];

/// Read-only facts a verification step may consult.
#[derive(Debug, Clone, Copy)]
pub struct VerificationEnv<'a> {
    pub catalog: &'a ServiceCatalog,
    pub today: NaiveDate,
    pub human_contact: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationEvent {
    Start {
        service: Option<String>,
        input: Option<UserInput>,
    },
    Message(UserInput),
    /// Registry answer for `lookup_id`.
    PatientFound(Option<PatientRecord>),
}

/// What the rest of the conversation needs after a positive verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handoff {
    pub service: String,
    pub patient: PatientRecord,
    /// What the patient pays, from the verdict.
    pub amount_due: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationEffect {
    LookupPatient { id: String },
    HandOffToScheduling(Handoff),
}

pub type VerificationTransition =
    Transition<VerificationState, VerificationPayload, VerificationEffect>;

pub fn transition(
    state: VerificationState,
    payload: VerificationPayload,
    event: VerificationEvent,
    env: &VerificationEnv<'_>,
) -> Result<VerificationTransition, DomainError> {
    use VerificationState::*;

    match (state, event) {
        (_, VerificationEvent::Start { service, input }) => Ok(start(service, input, env)),

        (IdentifyService, VerificationEvent::Message(input)) => {
            Ok(identify_service(payload, &input, env))
        }
        (IdentifyPatient, VerificationEvent::Message(input)) => Ok(identify_patient(payload, &input)),
        (CollectOrFetchPatientData, VerificationEvent::PatientFound(found)) => {
            Ok(patient_found(payload, found))
        }
        (CollectOrFetchPatientData, VerificationEvent::Message(input)) => {
            collect_field(payload, &input, env)
        }
        (ConfirmData, VerificationEvent::Message(input)) => confirm_data(payload, &input, env),
        (ComputeVerdict, VerificationEvent::Message(_)) => compute(ComputeVerdict, payload, env),

        (state, event) => Err(DomainError::new(
            ErrorCode::InvalidStateTransition,
            format!("verification cannot handle {:?} in {:?}", event_name(&event), state),
        )),
    }
}

fn event_name(event: &VerificationEvent) -> &'static str {
    match event {
        VerificationEvent::Start { .. } => "start",
        VerificationEvent::Message(_) => "message",
        VerificationEvent::PatientFound(_) => "patient_found",
    }
}

fn start(
    service: Option<String>,
    input: Option<UserInput>,
    env: &VerificationEnv<'_>,
) -> VerificationTransition {
    let resolved = service
        .as_deref()
        .and_then(|s| env.catalog.resolve_service(s))
        .or_else(|| input.as_ref().and_then(|i| env.catalog.service_from_input(i)));
    let mut payload = VerificationPayload::default();
    match resolved {
        Some(service) => {
            payload.service = Some(service.code.clone());
            let reply = identify_patient_reply(&format!(
                "Revisemos tu cobertura para {}.",
                service.name
            ));
            Transition::to(VerificationState::IdentifyPatient, payload).reply(reply)
        }
        None => Transition::to(VerificationState::IdentifyService, payload)
            .reply(service_list_reply(env, "¿Para qué servicio quieres revisar tu cobertura?")),
    }
}

fn service_list_reply(env: &VerificationEnv<'_>, question: &str) -> Reply {
    Reply::text(question).with_list("Servicios", env.catalog.service_rows())
}

fn identify_patient_reply(lead: &str) -> Reply {
    Reply::text(format!(
        "{} ¿Ya eres paciente de la clínica? Escribe el RUT o número de paciente, o \"nuevo\" si es tu primera vez.",
        lead
    ))
    .with_buttons(vec![(NEW_PATIENT_ID, "Soy nuevo")])
}

fn identify_service(
    mut payload: VerificationPayload,
    input: &UserInput,
    env: &VerificationEnv<'_>,
) -> VerificationTransition {
    match env.catalog.service_from_input(input) {
        Some(service) => {
            payload.service = Some(service.code.clone());
            let reply = identify_patient_reply(&format!("Perfecto, {}.", service.name));
            Transition::to(VerificationState::IdentifyPatient, payload).reply(reply)
        }
        None => Transition::to(VerificationState::IdentifyService, payload).reply(
            service_list_reply(env, "No reconocí ese servicio. Elige uno de la lista:"),
        ),
    }
}

fn identify_patient(mut payload: VerificationPayload, input: &UserInput) -> VerificationTransition {
    if input.raw == NEW_PATIENT_ID || contains_any(&input.normalized, NEW_PATIENT_WORDS) {
        return begin_walk(payload, "Tomemos tus datos.");
    }
    match parse_patient_id(&input.raw) {
        Some(id) => {
            payload.lookup_id = Some(id.clone());
            Transition::to(VerificationState::CollectOrFetchPatientData, payload)
                .effect(VerificationEffect::LookupPatient { id })
        }
        None => Transition::to(VerificationState::IdentifyPatient, payload).reply(
            Reply::text(
                "No pude leer ese número. Escribe solo los dígitos del RUT o número de paciente, o \"nuevo\".",
            )
            .with_buttons(vec![(NEW_PATIENT_ID, "Soy nuevo")]),
        ),
    }
}

fn begin_walk(mut payload: VerificationPayload, lead: &str) -> VerificationTransition {
    let first = PatientField::first();
    payload.pending_field = Some(first);
    payload.source = PatientSource::Collected;
    let reply = Reply::text(format!("{}\n\n{}", lead, first.prompt()));
    Transition::to(VerificationState::CollectOrFetchPatientData, payload).reply(reply)
}

fn patient_found(
    mut payload: VerificationPayload,
    found: Option<PatientRecord>,
) -> VerificationTransition {
    match found {
        Some(record) => {
            payload.patient = PatientRecord {
                id: record.id.clone().or_else(|| payload.lookup_id.clone()),
                ..record
            };
            payload.source = PatientSource::Registry;
            payload.pending_field = None;
            let reply = summary_reply(&payload.patient, "Encontramos estos datos:");
            Transition::to(VerificationState::ConfirmData, payload).reply(reply)
        }
        None => {
            payload.patient.id = payload.lookup_id.clone();
            begin_walk(payload, "No encontramos ese número en nuestros registros.")
        }
    }
}

fn summary_reply(patient: &PatientRecord, lead: &str) -> Reply {
    Reply::text(format!("{}\n\n{}\n\n¿Están correctos?", lead, patient.summary()))
        .with_buttons(vec![(DATA_OK_ID, "Sí, correctos"), (DATA_FIX_ID, "Corregir")])
}

fn collect_field(
    mut payload: VerificationPayload,
    input: &UserInput,
    env: &VerificationEnv<'_>,
) -> Result<VerificationTransition, DomainError> {
    let field = payload
        .pending_field
        .ok_or_else(|| DomainError::missing_field("verification", "pending_field"))?;
    let value = match field.validate(&input.raw, env.today) {
        Ok(value) => value,
        Err(_) => {
            let reply = Reply::text(format!("Ese dato no parece válido. {}", field.prompt()));
            return Ok(Transition::to(VerificationState::CollectOrFetchPatientData, payload)
                .reply(reply));
        }
    };
    payload.patient.set(field, value);
    if field == PatientField::InsuranceProvider {
        if let Some(provider) = env.catalog.resolve_provider(&payload.patient.insurance_provider) {
            payload.patient.insurance_provider = provider.name.clone();
        }
    }
    if payload.amending {
        payload.amending = false;
        payload.pending_field = None;
        let state = VerificationState::CollectOrFetchPatientData
            .transition_to(VerificationState::ComputeVerdict)?;
        return compute(state, payload, env);
    }
    match field.next() {
        Some(next) => {
            payload.pending_field = Some(next);
            Ok(Transition::to(VerificationState::CollectOrFetchPatientData, payload)
                .reply(Reply::text(next.prompt())))
        }
        None => {
            payload.pending_field = None;
            let reply = summary_reply(&payload.patient, "Estos son los datos que registramos:");
            Ok(Transition::to(VerificationState::ConfirmData, payload).reply(reply))
        }
    }
}

fn confirm_data(
    mut payload: VerificationPayload,
    input: &UserInput,
    env: &VerificationEnv<'_>,
) -> Result<VerificationTransition, DomainError> {
    if input.raw == DATA_OK_ID || (!input.is_selection() && is_affirmative(&input.normalized)) {
        let state = VerificationState::ConfirmData.transition_to(VerificationState::ComputeVerdict)?;
        return compute(state, payload, env);
    }
    if input.raw == DATA_FIX_ID || is_negative(&input.normalized) {
        payload.patient = PatientRecord {
            id: payload.patient.id.take(),
            ..PatientRecord::default()
        };
        return Ok(begin_walk(payload, "Corrijamos tus datos."));
    }
    let reply = summary_reply(&payload.patient, "Revisa tus datos:");
    Ok(Transition::to(VerificationState::ConfirmData, payload).reply(reply))
}

fn compute(
    state: VerificationState,
    mut payload: VerificationPayload,
    env: &VerificationEnv<'_>,
) -> Result<VerificationTransition, DomainError> {
    let service = payload
        .service
        .clone()
        .ok_or_else(|| DomainError::missing_field("verification", "service"))?;
    let verdict = decide(env.catalog, &payload.patient, &service, env.today);
    let text = verdict.render();
    let next_action = verdict.next_action;
    let amount_due = verdict.payment_info.amount_due();
    payload.verdict = Some(verdict);

    if next_action.leads_to_scheduling() {
        let state = state.transition_to(VerificationState::Handoff)?;
        let handoff = Handoff {
            service,
            patient: payload.patient.clone(),
            amount_due,
        };
        return Ok(Transition::to(state, payload)
            .reply(Reply::text(text))
            .effect(VerificationEffect::HandOffToScheduling(handoff)));
    }
    match next_action {
        NextAction::ReviewPatientData if payload.patient.birth_date.is_none() => {
            let state = state.transition_to(VerificationState::CollectOrFetchPatientData)?;
            payload.pending_field = Some(PatientField::BirthDate);
            payload.amending = true;
            let reply = Reply::text(text).followed_by(Reply::text(PatientField::BirthDate.prompt()));
            Ok(Transition::to(state, payload).reply(reply))
        }
        NextAction::ReviewPatientData => {
            let state = state.transition_to(VerificationState::ConfirmData)?;
            let reply = Reply::text(text).followed_by(summary_reply(&payload.patient, "Tus datos:"));
            Ok(Transition::to(state, payload).reply(reply))
        }
        _ => {
            let state = state.transition_to(VerificationState::HumanContact)?;
            let reply = Reply::text(format!(
                "{}\n\nEscríbenos a {} y una persona del equipo te ayudará.",
                text, env.human_contact
            ));
            Ok(Transition::to(state, payload).reply(reply))
        }
    }
}

/// Re-renders the prompt of the current state.
pub fn prompt(
    state: VerificationState,
    payload: &VerificationPayload,
    env: &VerificationEnv<'_>,
) -> Reply {
    match state {
        VerificationState::IdentifyService => {
            service_list_reply(env, "¿Para qué servicio quieres revisar tu cobertura?")
        }
        VerificationState::IdentifyPatient => identify_patient_reply("Sigamos con tu cobertura."),
        VerificationState::CollectOrFetchPatientData => match payload.pending_field {
            Some(field) => Reply::text(field.prompt()),
            None => identify_patient_reply("Sigamos con tu cobertura."),
        },
        VerificationState::ConfirmData | VerificationState::ComputeVerdict => {
            summary_reply(&payload.patient, "Tus datos:")
        }
        VerificationState::Handoff | VerificationState::HumanContact => {
            Reply::text("La revisión de tu cobertura ya terminó.")
        }
    }
}

/// Whether `input` is an answer the current state can act on.
pub fn understands(
    state: VerificationState,
    payload: &VerificationPayload,
    input: &UserInput,
    env: &VerificationEnv<'_>,
) -> bool {
    if input.is_selection() {
        return true;
    }
    match state {
        VerificationState::IdentifyService => env.catalog.service_from_input(input).is_some(),
        VerificationState::IdentifyPatient => {
            parse_patient_id(&input.raw).is_some()
                || contains_any(&input.normalized, NEW_PATIENT_WORDS)
        }
        VerificationState::CollectOrFetchPatientData => payload
            .pending_field
            .is_some_and(|field| field.validate(&input.raw, env.today).is_ok()),
        VerificationState::ConfirmData | VerificationState::ComputeVerdict => {
            is_affirmative(&input.normalized) || is_negative(&input.normalized)
        }
        VerificationState::Handoff | VerificationState::HumanContact => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decision::CoverageClass;

    fn catalog() -> ServiceCatalog {
        ServiceCatalog::embedded().unwrap()
    }

    fn env(catalog: &ServiceCatalog) -> VerificationEnv<'_> {
        VerificationEnv {
            catalog,
            today: NaiveDate::from_ymd_opt(2025, 10, 15).unwrap(),
            human_contact: "+56 2 2345 6789",
        }
    }

    fn step(
        t: VerificationTransition,
        event: VerificationEvent,
        env: &VerificationEnv<'_>,
    ) -> VerificationTransition {
        transition(t.state, t.payload, event, env).unwrap()
    }

    fn say(text: &str) -> VerificationEvent {
        VerificationEvent::Message(UserInput::text(text))
    }

    fn started(env: &VerificationEnv<'_>) -> VerificationTransition {
        transition(
            VerificationState::default(),
            VerificationPayload::default(),
            VerificationEvent::Start {
                service: None,
                input: Some(UserInput::text("quiero saber si me cubren la consulta pediatrica")),
            },
            env,
        )
        .unwrap()
    }

    #[test]
    fn start_resolves_service_from_text() {
        let catalog = catalog();
        let env = env(&catalog);
        let t = started(&env);
        assert_eq!(t.state, VerificationState::IdentifyPatient);
        assert_eq!(t.payload.service.as_deref(), Some("consulta-pediatrica"));
    }

    #[test]
    fn start_without_service_lists_services() {
        let catalog = catalog();
        let env = env(&catalog);
        let t = transition(
            VerificationState::default(),
            VerificationPayload::default(),
            VerificationEvent::Start {
                service: None,
                input: Some(UserInput::text("quiero revisar mi cobertura")),
            },
            &env,
        )
        .unwrap();
        assert_eq!(t.state, VerificationState::IdentifyService);
        let reply = t.reply.unwrap();
        assert!(reply
            .interactive
            .unwrap()
            .option_ids()
            .contains(&"svc:kinesiologia"));
    }

    #[test]
    fn valid_id_requests_lookup_and_found_record_is_confirmed() {
        let catalog = catalog();
        let env = env(&catalog);
        let t = step(started(&env), say("12.345.678"), &env);
        assert_eq!(t.state, VerificationState::CollectOrFetchPatientData);
        assert_eq!(
            t.effects,
            vec![VerificationEffect::LookupPatient {
                id: "12345678".to_string()
            }]
        );
        let record = PatientRecord {
            name: "Tomás Rojas".to_string(),
            insurance_provider: "Isapre A".to_string(),
            birth_date: NaiveDate::from_ymd_opt(2019, 3, 4),
            ..PatientRecord::default()
        };
        let t = step(t, VerificationEvent::PatientFound(Some(record)), &env);
        assert_eq!(t.state, VerificationState::ConfirmData);
        assert_eq!(t.payload.source, PatientSource::Registry);
        assert_eq!(t.payload.patient.id.as_deref(), Some("12345678"));
    }

    #[test]
    fn registry_record_without_birth_date_asks_only_for_it() {
        let catalog = catalog();
        let env = env(&catalog);
        let t = transition(
            VerificationState::default(),
            VerificationPayload::default(),
            VerificationEvent::Start {
                service: Some("evaluacion-desarrollo".to_string()),
                input: None,
            },
            &env,
        )
        .unwrap();
        let t = step(t, say("12.345.678"), &env);
        let record = PatientRecord {
            name: "Tomás Rojas".to_string(),
            insurance_provider: "Isapre A".to_string(),
            birth_date: None,
            ..PatientRecord::default()
        };
        let t = step(t, VerificationEvent::PatientFound(Some(record)), &env);
        let t = step(t, VerificationEvent::Message(UserInput::selection(DATA_OK_ID)), &env);

        assert_eq!(t.state, VerificationState::CollectOrFetchPatientData);
        assert_eq!(t.payload.pending_field, Some(PatientField::BirthDate));
        assert!(t.reply.as_ref().unwrap().text.contains("fecha de nacimiento"));

        let t = step(t, say("15/10/2023"), &env);
        assert!(matches!(
            t.state,
            VerificationState::Handoff | VerificationState::HumanContact
        ));
        assert!(!t.payload.amending);
        assert_eq!(t.payload.patient.name, "Tomás Rojas");
        assert_ne!(
            t.payload.verdict.map(|v| v.next_action),
            Some(NextAction::ReviewPatientData)
        );
    }

    #[test]
    fn malformed_id_is_reprompted_without_lookup() {
        let catalog = catalog();
        let env = env(&catalog);
        let t = step(started(&env), say("abc12"), &env);
        assert_eq!(t.state, VerificationState::IdentifyPatient);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn unknown_id_starts_field_walk() {
        let catalog = catalog();
        let env = env(&catalog);
        let t = step(started(&env), say("99999"), &env);
        let t = step(t, VerificationEvent::PatientFound(None), &env);
        assert_eq!(t.state, VerificationState::CollectOrFetchPatientData);
        assert_eq!(t.payload.pending_field, Some(PatientField::InsuranceProvider));
        assert!(t.reply.unwrap().text.contains("previsión"));
    }

    fn walk(env: &VerificationEnv<'_>) -> VerificationTransition {
        let mut t = step(started(env), VerificationEvent::Message(UserInput::selection(NEW_PATIENT_ID)), env);
        for answer in [
            "isapre a",
            "Plan Familiar",
            "Tomás Rojas",
            "04/03/2019",
            "+56 9 1234 5678",
            "ana@mail.cl",
            "778899",
        ] {
            t = step(t, say(answer), env);
        }
        t
    }

    #[test]
    fn field_walk_reaches_summary_with_canonical_provider() {
        let catalog = catalog();
        let env = env(&catalog);
        let t = walk(&env);
        assert_eq!(t.state, VerificationState::ConfirmData);
        assert_eq!(t.payload.patient.insurance_provider, "Isapre A");
        assert!(t.reply.unwrap().text.contains("Tomás Rojas"));
    }

    #[test]
    fn invalid_date_reprompts_same_field() {
        let catalog = catalog();
        let env = env(&catalog);
        let mut t = step(started(&env), say("nuevo"), &env);
        for answer in ["fonasa", "B", "Tomás Rojas"] {
            t = step(t, say(answer), &env);
        }
        assert_eq!(t.payload.pending_field, Some(PatientField::BirthDate));
        let t = step(t, say("31/02/2019"), &env);
        assert_eq!(t.payload.pending_field, Some(PatientField::BirthDate));
        assert!(t.reply.unwrap().text.starts_with("Ese dato no parece válido."));
    }

    #[test]
    fn confirmation_computes_verdict_and_hands_off() {
        let catalog = catalog();
        let env = env(&catalog);
        let t = step(walk(&env), say("si"), &env);
        assert_eq!(t.state, VerificationState::Handoff);
        assert_eq!(
            t.payload.verdict.as_ref().map(|v| v.classification),
            Some(CoverageClass::Covered)
        );
        match t.effects.as_slice() {
            [VerificationEffect::HandOffToScheduling(handoff)] => {
                assert_eq!(handoff.service, "consulta-pediatrica");
                assert_eq!(handoff.amount_due, Some(4000));
                assert_eq!(handoff.patient.name, "Tomás Rojas");
            }
            other => panic!("unexpected effects {:?}", other),
        }
        assert!(t.reply.unwrap().text.contains("Copago: $4.000"));
    }

    #[test]
    fn disputed_summary_restarts_walk() {
        let catalog = catalog();
        let env = env(&catalog);
        let t = step(walk(&env), VerificationEvent::Message(UserInput::selection(DATA_FIX_ID)), &env);
        assert_eq!(t.state, VerificationState::CollectOrFetchPatientData);
        assert_eq!(t.payload.pending_field, Some(PatientField::first()));
        assert!(t.payload.patient.name.is_empty());
    }

    #[test]
    fn unknown_insurer_ends_in_human_contact() {
        let catalog = catalog();
        let env = env(&catalog);
        let mut t = step(started(&env), say("nuevo"), &env);
        for answer in [
            "Isapre Z",
            "Plan 1",
            "Tomás Rojas",
            "04/03/2019",
            "987654321",
            "ana@mail.cl",
            "1",
        ] {
            t = step(t, say(answer), &env);
        }
        let t = step(t, say("si"), &env);
        assert_eq!(t.state, VerificationState::HumanContact);
        assert!(t.effects.is_empty());
        assert!(t.reply.unwrap().text.contains("+56 2 2345 6789"));
    }

    #[test]
    fn missing_birth_date_goes_back_to_summary() {
        let catalog = catalog();
        let env = env(&catalog);
        let t = step(started(&env), say("12345"), &env);
        let record = PatientRecord {
            name: "Tomás Rojas".to_string(),
            insurance_provider: "A".to_string(),
            ..PatientRecord::default()
        };
        let t = step(t, VerificationEvent::PatientFound(Some(record)), &env);
        let t = step(t, say("si"), &env);
        assert_eq!(t.state, VerificationState::ConfirmData);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn understands_answers_but_not_unrelated_questions() {
        let catalog = catalog();
        let env = env(&catalog);
        let t = started(&env);
        assert!(understands(t.state, &t.payload, &UserInput::text("12345678"), &env));
        assert!(!understands(
            t.state,
            &t.payload,
            &UserInput::text("¿donde estan ubicados?"),
            &env
        ));
    }

    #[test]
    fn terminal_states_reject_events() {
        let catalog = catalog();
        let env = env(&catalog);
        assert!(transition(
            VerificationState::Handoff,
            VerificationPayload::default(),
            say("hola"),
            &env
        )
        .is_err());
    }
}
