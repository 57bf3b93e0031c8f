//! Verification shell: registry lookups around the verification machine.
//!
//! A finished verification leaves its handoff in the [`StepOutcome`]; the
//! orchestrator starts scheduling from it in the same turn.

use std::sync::Arc;

use super::{combine, runaway, StepOutcome, WorkflowError, WorkflowSettings, MAX_CHAINED_EVENTS};
use crate::application::retry::{with_retry, RetryPolicy};
use crate::domain::conversation::{ConversationContext, Flow, UserInput};
use crate::domain::foundation::{DomainError, ErrorCode, StateMachine, Timestamp};
use crate::domain::payment::Quote;
use crate::domain::verification::machine::{self, VerificationEffect, VerificationEvent};
use crate::domain::verification::{VerificationPayload, VerificationState};
use crate::ports::{ExternalError, PatientRegistry};

pub struct VerificationWorkflow {
    registry: Arc<dyn PatientRegistry>,
    settings: Arc<WorkflowSettings>,
    retry: RetryPolicy,
}

impl VerificationWorkflow {
    pub fn new(
        registry: Arc<dyn PatientRegistry>,
        settings: Arc<WorkflowSettings>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            settings,
            retry,
        }
    }

    pub async fn start(
        &self,
        ctx: &mut ConversationContext,
        service: Option<String>,
        input: Option<UserInput>,
    ) -> Result<StepOutcome, WorkflowError> {
        let event = VerificationEvent::Start { service, input };
        self.run(
            ctx,
            VerificationState::default(),
            VerificationPayload::default(),
            event,
        )
        .await
    }

    pub async fn step(
        &self,
        ctx: &mut ConversationContext,
        input: UserInput,
    ) -> Result<StepOutcome, WorkflowError> {
        let (state, payload) = match &ctx.flow {
            Flow::Verification { state, payload } => (*state, payload.clone()),
            other => {
                return Err(DomainError::new(
                    ErrorCode::InvalidStateTransition,
                    format!("verification step with {} active", other.workflow()),
                )
                .into())
            }
        };
        self.run(ctx, state, payload, VerificationEvent::Message(input))
            .await
    }

    async fn run(
        &self,
        ctx: &mut ConversationContext,
        mut state: VerificationState,
        mut payload: VerificationPayload,
        first: VerificationEvent,
    ) -> Result<StepOutcome, WorkflowError> {
        let now = Timestamp::now();
        let mut replies = Vec::new();
        let mut handoff = None;
        let mut next = Some(first);
        let mut chained = 0;

        while let Some(event) = next.take() {
            chained += 1;
            if chained > MAX_CHAINED_EVENTS {
                return Err(runaway("verification").into());
            }
            let env = self.settings.verification_env(now);
            let transition = machine::transition(state, payload, event, &env)?;
            tracing::debug!(
                user_id = %ctx.user_id,
                from = state.name(),
                to = transition.state.name(),
                "verification transition"
            );
            state = transition.state;
            payload = transition.payload;
            replies.extend(transition.reply);

            for effect in transition.effects {
                match effect {
                    VerificationEffect::LookupPatient { id } => {
                        let found = with_retry(&self.retry, "registry.find_by_id", || {
                            self.registry.find_by_id(&id)
                        })
                        .await;
                        let found = match found {
                            Ok(found) => found,
                            Err(ExternalError::NotFound(_)) => None,
                            Err(err) => return Err(err.into()),
                        };
                        tracing::info!(
                            user_id = %ctx.user_id,
                            found = found.is_some(),
                            "patient registry lookup"
                        );
                        next = Some(VerificationEvent::PatientFound(found));
                    }
                    VerificationEffect::HandOffToScheduling(ready) => {
                        ctx.quote = ready.amount_due.map(|amount| Quote {
                            service: ready.service.clone(),
                            amount,
                        });
                        handoff = Some(ready);
                    }
                }
            }
        }

        if let Some(verdict) = &payload.verdict {
            tracing::info!(
                user_id = %ctx.user_id,
                classification = ?verdict.classification,
                next_action = ?verdict.next_action,
                "coverage verdict"
            );
        }
        ctx.flow = Flow::Verification { state, payload };
        Ok(StepOutcome {
            reply: combine(replies),
            handoff,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::registry::InMemoryPatientRegistry;
    use crate::domain::decision::ServiceCatalog;
    use crate::domain::foundation::UserId;
    use crate::domain::verification::machine::DATA_OK_ID;
    use crate::domain::verification::PatientRecord;
    use chrono::{FixedOffset, NaiveDate};
    use std::time::Duration;

    fn settings() -> Arc<WorkflowSettings> {
        Arc::new(WorkflowSettings {
            catalog: Arc::new(ServiceCatalog::embedded().unwrap()),
            offset: FixedOffset::west_opt(3 * 3600).unwrap(),
            slot_limit: 5,
            search_days: 14,
            human_contact: "+56 2 2345 6789".to_string(),
        })
    }

    fn context() -> ConversationContext {
        ConversationContext::new(UserId::new("+56911112222").unwrap())
    }

    fn known_patient() -> PatientRecord {
        let catalog = settings().catalog.clone();
        PatientRecord {
            id: Some("12345678".to_string()),
            name: "Ana Pérez".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 3, 14),
            insurance_provider: catalog.providers[0].name.clone(),
            plan: "Plan base".to_string(),
            member_number: "998877".to_string(),
            phone: "+56911112222".to_string(),
            email: "ana@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn registry_hit_goes_straight_to_confirmation() {
        let registry = Arc::new(InMemoryPatientRegistry::new(vec![known_patient()]));
        let shell = VerificationWorkflow::new(
            registry,
            settings(),
            RetryPolicy::no_retry(Duration::from_secs(2)),
        );
        let mut ctx = context();
        let service = settings().catalog.services[0].code.clone();

        shell.start(&mut ctx, Some(service), None).await.unwrap();
        let found = shell
            .step(&mut ctx, UserInput::text("12345678"))
            .await
            .unwrap();
        assert!(found.reply.text.contains("Ana Pérez"));
        assert!(matches!(
            ctx.flow,
            Flow::Verification {
                state: VerificationState::ConfirmData,
                ..
            }
        ));

        let verdict = shell
            .step(&mut ctx, UserInput::selection(DATA_OK_ID))
            .await
            .unwrap();
        assert!(ctx.flow.is_terminal());
        if verdict.handoff.is_some() {
            assert!(matches!(
                ctx.flow,
                Flow::Verification {
                    state: VerificationState::Handoff,
                    ..
                }
            ));
        }
    }

    #[tokio::test]
    async fn registry_miss_starts_the_field_walk() {
        let registry = Arc::new(InMemoryPatientRegistry::new(Vec::new()));
        let shell = VerificationWorkflow::new(
            registry,
            settings(),
            RetryPolicy::no_retry(Duration::from_secs(2)),
        );
        let mut ctx = context();
        let service = settings().catalog.services[0].code.clone();

        shell.start(&mut ctx, Some(service), None).await.unwrap();
        shell.step(&mut ctx, UserInput::text("87654321")).await.unwrap();
        match &ctx.flow {
            Flow::Verification { state, payload } => {
                assert_eq!(*state, VerificationState::CollectOrFetchPatientData);
                assert!(payload.pending_field.is_some());
                assert_eq!(payload.patient.id.as_deref(), Some("87654321"));
            }
            other => panic!("unexpected flow {:?}", other),
        }
    }
}
