//! Pure transition function of the payment workflow.
//!
//! Proof of payment is accepted as sent, image or text, and the workflow
//! ends. Nothing here ever asks for the same proof twice.

use super::state::{PaymentPayload, PaymentReceipt, PaymentState, Quote};
use crate::domain::conversation::text::{contains_any, is_affirmative, is_negative};
use crate::domain::conversation::{Reply, Transition, UserInput};
use crate::domain::decision::{format_clp, Service, ServiceCatalog};
use crate::domain::foundation::{DomainError, ErrorCode, StateMachine, Timestamp};

pub const PAY_ID: &str = "pay:yes";
pub const CHANGE_SERVICE_ID: &str = "pay:change";

/// Phrases meaning "I already paid", answered with a request for the proof.
const PAID_CLAIMS: &[&str] = &[
    "ya pague",
    "pague",
    "listo",
    "transferi",
    "hice el pago",
    "ya hice el pago",
    "comprobante",
];

#[derive(Debug, Clone, Copy)]
pub struct PaymentEnv<'a> {
    pub catalog: &'a ServiceCatalog,
    pub now: Timestamp,
    /// Amount from a recent coverage verdict, if any.
    pub quote: Option<&'a Quote>,
}

impl PaymentEnv<'_> {
    fn amount_for(&self, service: &Service) -> u32 {
        self.quote
            .filter(|q| q.service == service.code)
            .map(|q| q.amount)
            .unwrap_or(service.private_price)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    Start {
        service: Option<String>,
        input: Option<UserInput>,
    },
    Message(UserInput),
    LinkCreated { url: String, reference: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEffect {
    CreateLink { service: String, amount: u32 },
    RecordReceipt(PaymentReceipt),
}

pub type PaymentTransition = Transition<PaymentState, PaymentPayload, PaymentEffect>;

pub fn transition(
    state: PaymentState,
    payload: PaymentPayload,
    event: PaymentEvent,
    env: &PaymentEnv<'_>,
) -> Result<PaymentTransition, DomainError> {
    use PaymentState::*;

    match (state, event) {
        (_, PaymentEvent::Start { service, input }) => Ok(start(service, input, env)),
        (SelectingService, PaymentEvent::Message(input)) => Ok(select_service(payload, &input, env)),
        (ConfirmingService, PaymentEvent::Message(input)) => confirming(payload, &input, env),
        (ConfirmingService, PaymentEvent::LinkCreated { url, reference }) => {
            link_created(payload, url, reference)
        }
        (LinkIssued, PaymentEvent::Message(input)) => link_issued(payload, &input, env),
        (AwaitingProof, PaymentEvent::Message(input)) => record(AwaitingProof, payload, &input, env),
        (state, event) => Err(DomainError::new(
            ErrorCode::InvalidStateTransition,
            format!(
                "payment cannot handle {} in {:?}",
                match event {
                    PaymentEvent::Start { .. } => "start",
                    PaymentEvent::Message(_) => "message",
                    PaymentEvent::LinkCreated { .. } => "link_created",
                },
                state
            ),
        )),
    }
}

fn start(service: Option<String>, input: Option<UserInput>, env: &PaymentEnv<'_>) -> PaymentTransition {
    let resolved = service
        .as_deref()
        .and_then(|s| env.catalog.resolve_service(s))
        .or_else(|| input.as_ref().and_then(|i| env.catalog.service_from_input(i)));
    match resolved {
        Some(service) => confirm_service(PaymentPayload::default(), service, env),
        None => Transition::to(PaymentState::SelectingService, PaymentPayload::default())
            .reply(service_list_reply(env, "¿Qué servicio quieres pagar?")),
    }
}

fn service_list_reply(env: &PaymentEnv<'_>, question: &str) -> Reply {
    Reply::text(question).with_list("Servicios", env.catalog.service_rows())
}

fn confirm_service(
    mut payload: PaymentPayload,
    service: &Service,
    env: &PaymentEnv<'_>,
) -> PaymentTransition {
    let amount = env.amount_for(service);
    payload.service = Some(service.code.clone());
    payload.amount = Some(amount);
    let reply = confirm_reply(&service.name, amount);
    Transition::to(PaymentState::ConfirmingService, payload).reply(reply)
}

fn confirm_reply(service_name: &str, amount: u32) -> Reply {
    Reply::text(format!(
        "El valor de {} es {}. ¿Te envío el link de pago?",
        service_name,
        format_clp(amount)
    ))
    .with_buttons(vec![(PAY_ID, "Sí, pagar"), (CHANGE_SERVICE_ID, "Otro servicio")])
}

fn select_service(payload: PaymentPayload, input: &UserInput, env: &PaymentEnv<'_>) -> PaymentTransition {
    match env.catalog.service_from_input(input) {
        Some(service) => confirm_service(payload, service, env),
        None => Transition::to(PaymentState::SelectingService, payload)
            .reply(service_list_reply(env, "No reconocí ese servicio. Elige uno de la lista:")),
    }
}

fn service_name<'a>(env: &PaymentEnv<'a>, code: &'a str) -> &'a str {
    env.catalog
        .service_by_code(code)
        .map(|s| s.name.as_str())
        .unwrap_or(code)
}

fn confirming(
    payload: PaymentPayload,
    input: &UserInput,
    env: &PaymentEnv<'_>,
) -> Result<PaymentTransition, DomainError> {
    let service = payload
        .service
        .clone()
        .ok_or_else(|| DomainError::missing_field("payment", "service"))?;
    let amount = payload
        .amount
        .ok_or_else(|| DomainError::missing_field("payment", "amount"))?;

    if input.raw == PAY_ID || (!input.is_selection() && is_affirmative(&input.normalized)) {
        return Ok(Transition::to(PaymentState::ConfirmingService, payload)
            .effect(PaymentEffect::CreateLink { service, amount }));
    }
    if input.raw == CHANGE_SERVICE_ID || is_negative(&input.normalized) {
        return Ok(Transition::to(PaymentState::SelectingService, PaymentPayload::default())
            .reply(service_list_reply(env, "¿Qué servicio quieres pagar?")));
    }
    if let Some(other) = env.catalog.service_from_input(input) {
        return Ok(confirm_service(PaymentPayload::default(), other, env));
    }
    let reply = confirm_reply(service_name(env, &service), amount);
    Ok(Transition::to(PaymentState::ConfirmingService, payload).reply(reply))
}

fn link_created(
    mut payload: PaymentPayload,
    url: String,
    reference: String,
) -> Result<PaymentTransition, DomainError> {
    let amount = payload
        .amount
        .ok_or_else(|| DomainError::missing_field("payment", "amount"))?;
    let reply = Reply::text(format!(
        "Este es tu link de pago por {}:\n{}\n\nCuando pagues, envíanos una foto o captura del comprobante.",
        format_clp(amount),
        url
    ));
    payload.link_url = Some(url);
    payload.reference = Some(reference);
    Ok(Transition::to(PaymentState::LinkIssued, payload).reply(reply))
}

fn link_issued(
    payload: PaymentPayload,
    input: &UserInput,
    env: &PaymentEnv<'_>,
) -> Result<PaymentTransition, DomainError> {
    if input.is_image() {
        return record(PaymentState::LinkIssued, payload, input, env);
    }
    if contains_any(&input.normalized, PAID_CLAIMS) {
        return Ok(Transition::to(PaymentState::AwaitingProof, payload).reply(Reply::text(
            "¡Gracias! Envíanos el comprobante (foto, captura o número de transacción) para registrarlo.",
        )));
    }
    let url = payload
        .link_url
        .clone()
        .ok_or_else(|| DomainError::missing_field("payment", "link_url"))?;
    Ok(Transition::to(PaymentState::LinkIssued, payload).reply(Reply::text(format!(
        "Tu link de pago sigue disponible:\n{}\n\nCuando pagues, envíanos el comprobante.",
        url
    ))))
}

/// Accepts whatever arrived as proof and closes the workflow.
fn record(
    from: PaymentState,
    mut payload: PaymentPayload,
    input: &UserInput,
    env: &PaymentEnv<'_>,
) -> Result<PaymentTransition, DomainError> {
    let reference = payload
        .reference
        .clone()
        .ok_or_else(|| DomainError::missing_field("payment", "reference"))?;
    let service = payload
        .service
        .clone()
        .ok_or_else(|| DomainError::missing_field("payment", "service"))?;
    let amount = payload
        .amount
        .ok_or_else(|| DomainError::missing_field("payment", "amount"))?;
    let state = from.transition_to(PaymentState::Recorded)?;

    let proof = if input.raw.is_empty() {
        "(sin detalle)".to_string()
    } else {
        input.raw.clone()
    };
    payload.proof = Some(proof.clone());
    let receipt = PaymentReceipt {
        reference,
        service: service.clone(),
        amount,
        proof,
        recorded_at: env.now,
    };
    let reply = Reply::text(format!(
        "Recibimos tu comprobante. Tu pago de {} por {} quedó registrado. ¡Gracias!",
        format_clp(amount),
        service_name(env, &service)
    ));
    Ok(Transition::to(state, payload)
        .reply(reply)
        .effect(PaymentEffect::RecordReceipt(receipt)))
}

/// Re-renders the prompt of the current state.
pub fn prompt(state: PaymentState, payload: &PaymentPayload, env: &PaymentEnv<'_>) -> Reply {
    match (state, &payload.service, payload.amount, &payload.link_url) {
        (PaymentState::ConfirmingService, Some(service), Some(amount), _) => {
            confirm_reply(service_name(env, service), amount)
        }
        (PaymentState::LinkIssued, _, _, Some(url)) => Reply::text(format!(
            "Tu link de pago sigue disponible:\n{}\n\nCuando pagues, envíanos el comprobante.",
            url
        )),
        (PaymentState::AwaitingProof, ..) => {
            Reply::text("Quedamos atentos a tu comprobante de pago (foto o captura).")
        }
        (PaymentState::Recorded, ..) => Reply::text("Tu pago ya quedó registrado."),
        _ => service_list_reply(env, "¿Qué servicio quieres pagar?"),
    }
}

/// Whether `input` is something the current state can act on.
pub fn understands(
    state: PaymentState,
    _payload: &PaymentPayload,
    input: &UserInput,
    env: &PaymentEnv<'_>,
) -> bool {
    if input.is_selection() || input.is_image() {
        return true;
    }
    match state {
        PaymentState::SelectingService => env.catalog.service_from_input(input).is_some(),
        PaymentState::ConfirmingService => {
            is_affirmative(&input.normalized)
                || is_negative(&input.normalized)
                || env.catalog.service_from_input(input).is_some()
        }
        PaymentState::LinkIssued => contains_any(&input.normalized, PAID_CLAIMS),
        // any text is accepted as proof, but only these outrank a keyword
        PaymentState::AwaitingProof => {
            input.raw.chars().any(|c| c.is_ascii_digit())
                || contains_any(&input.normalized, PAID_CLAIMS)
        }
        PaymentState::Recorded => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::MessageKind;

    fn catalog() -> ServiceCatalog {
        ServiceCatalog::embedded().unwrap()
    }

    fn env<'a>(catalog: &'a ServiceCatalog, quote: Option<&'a Quote>) -> PaymentEnv<'a> {
        PaymentEnv {
            catalog,
            now: Timestamp::from_unix_secs(1_760_533_200).unwrap(),
            quote,
        }
    }

    fn step(t: PaymentTransition, event: PaymentEvent, env: &PaymentEnv<'_>) -> PaymentTransition {
        transition(t.state, t.payload, event, env).unwrap()
    }

    fn start(env: &PaymentEnv<'_>, service: Option<&str>) -> PaymentTransition {
        transition(
            PaymentState::default(),
            PaymentPayload::default(),
            PaymentEvent::Start {
                service: service.map(str::to_string),
                input: Some(UserInput::text("quiero pagar")),
            },
            env,
        )
        .unwrap()
    }

    fn issued(env: &PaymentEnv<'_>) -> PaymentTransition {
        let t = start(env, Some("kinesiologia"));
        let t = step(t, PaymentEvent::Message(UserInput::selection(PAY_ID)), env);
        step(
            t,
            PaymentEvent::LinkCreated {
                url: "https://pay.example/cs_1".to_string(),
                reference: "cs_1".to_string(),
            },
            env,
        )
    }

    #[test]
    fn unknown_service_lists_catalog() {
        let catalog = catalog();
        let env = env(&catalog, None);
        let t = start(&env, None);
        assert_eq!(t.state, PaymentState::SelectingService);
        let t = step(t, PaymentEvent::Message(UserInput::selection("svc:fonoaudiologia")), &env);
        assert_eq!(t.state, PaymentState::ConfirmingService);
        assert_eq!(t.payload.amount, Some(30000));
    }

    #[test]
    fn amount_prefers_matching_quote() {
        let catalog = catalog();
        let quote = Quote {
            service: "consulta-pediatrica".to_string(),
            amount: 4000,
        };
        let env = env(&catalog, Some(&quote));
        let t = start(&env, Some("consulta-pediatrica"));
        assert_eq!(t.payload.amount, Some(4000));
        assert!(t.reply.unwrap().text.contains("$4.000"));
        let other = start(&env, Some("kinesiologia"));
        assert_eq!(other.payload.amount, Some(28000));
    }

    #[test]
    fn confirmation_requests_link_then_issues_it() {
        let catalog = catalog();
        let env = env(&catalog, None);
        let t = start(&env, Some("kinesiologia"));
        let t = step(t, PaymentEvent::Message(UserInput::text("si")), &env);
        assert_eq!(
            t.effects,
            vec![PaymentEffect::CreateLink {
                service: "kinesiologia".to_string(),
                amount: 28000
            }]
        );
        let t = issued(&env);
        assert_eq!(t.state, PaymentState::LinkIssued);
        assert!(t.reply.unwrap().text.contains("https://pay.example/cs_1"));
    }

    #[test]
    fn image_after_link_is_recorded_immediately() {
        let catalog = catalog();
        let env = env(&catalog, None);
        let t = step(
            issued(&env),
            PaymentEvent::Message(UserInput::new(MessageKind::Image, "media:123")),
            &env,
        );
        assert_eq!(t.state, PaymentState::Recorded);
        match t.effects.as_slice() {
            [PaymentEffect::RecordReceipt(receipt)] => {
                assert_eq!(receipt.reference, "cs_1");
                assert_eq!(receipt.proof, "media:123");
                assert_eq!(receipt.amount, 28000);
            }
            other => panic!("unexpected effects {:?}", other),
        }
    }

    #[test]
    fn claim_then_text_proof_is_accepted_unconditionally() {
        let catalog = catalog();
        let env = env(&catalog, None);
        let t = step(issued(&env), PaymentEvent::Message(UserInput::text("ya pagué")), &env);
        assert_eq!(t.state, PaymentState::AwaitingProof);
        let t = step(t, PaymentEvent::Message(UserInput::text("transaccion 88812")), &env);
        assert_eq!(t.state, PaymentState::Recorded);
        assert_eq!(t.payload.proof.as_deref(), Some("transaccion 88812"));
        assert!(t.reply.unwrap().text.contains("quedó registrado"));
    }

    #[test]
    fn awaiting_proof_claims_transaction_numbers_not_commands() {
        let catalog = catalog();
        let env = env(&catalog, None);
        let payload = PaymentPayload::default();
        let claims = |text: &str| {
            understands(PaymentState::AwaitingProof, &payload, &UserInput::text(text), &env)
        };
        assert!(claims("transaccion 88812"));
        assert!(claims("te mando el comprobante"));
        assert!(!claims("quiero agendar una hora"));
    }

    #[test]
    fn recorded_rejects_further_messages() {
        let catalog = catalog();
        let env = env(&catalog, None);
        assert!(transition(
            PaymentState::Recorded,
            PaymentPayload::default(),
            PaymentEvent::Message(UserInput::text("hola")),
            &env
        )
        .is_err());
    }

    #[test]
    fn unrelated_text_after_link_reminds_link() {
        let catalog = catalog();
        let env = env(&catalog, None);
        let t = step(issued(&env), PaymentEvent::Message(UserInput::text("mmm")), &env);
        assert_eq!(t.state, PaymentState::LinkIssued);
        assert!(t.reply.unwrap().text.contains("sigue disponible"));
    }
}
