//! Payment shell: link creation and receipt bookkeeping around the
//! payment machine.

use std::sync::Arc;

use super::{combine, runaway, StepOutcome, WorkflowError, WorkflowSettings, MAX_CHAINED_EVENTS};
use crate::application::retry::{with_retry, RetryPolicy};
use crate::domain::conversation::{ConversationContext, Flow, UserInput};
use crate::domain::foundation::{DomainError, ErrorCode, StateMachine, Timestamp};
use crate::domain::payment::machine::{self, PaymentEffect, PaymentEvent};
use crate::domain::payment::{PaymentPayload, PaymentState};
use crate::ports::{PaymentLinkRequest, PaymentProvider};

pub struct PaymentWorkflow {
    payments: Arc<dyn PaymentProvider>,
    settings: Arc<WorkflowSettings>,
    retry: RetryPolicy,
}

impl PaymentWorkflow {
    pub fn new(
        payments: Arc<dyn PaymentProvider>,
        settings: Arc<WorkflowSettings>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            payments,
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
        let event = PaymentEvent::Start { service, input };
        self.run(ctx, PaymentState::default(), PaymentPayload::default(), event)
            .await
    }

    pub async fn step(
        &self,
        ctx: &mut ConversationContext,
        input: UserInput,
    ) -> Result<StepOutcome, WorkflowError> {
        let (state, payload) = match &ctx.flow {
            Flow::Payment { state, payload } => (*state, payload.clone()),
            other => {
                return Err(DomainError::new(
                    ErrorCode::InvalidStateTransition,
                    format!("payment step with {} active", other.workflow()),
                )
                .into())
            }
        };
        self.run(ctx, state, payload, PaymentEvent::Message(input)).await
    }

    async fn run(
        &self,
        ctx: &mut ConversationContext,
        mut state: PaymentState,
        mut payload: PaymentPayload,
        first: PaymentEvent,
    ) -> Result<StepOutcome, WorkflowError> {
        let now = Timestamp::now();
        let quote = ctx.quote.clone();
        let mut replies = Vec::new();
        let mut next = Some(first);
        let mut chained = 0;

        while let Some(event) = next.take() {
            chained += 1;
            if chained > MAX_CHAINED_EVENTS {
                return Err(runaway("payment").into());
            }
            let env = self.settings.payment_env(quote.as_ref(), now);
            let transition = machine::transition(state, payload, event, &env)?;
            tracing::debug!(
                user_id = %ctx.user_id,
                from = state.name(),
                to = transition.state.name(),
                "payment transition"
            );
            state = transition.state;
            payload = transition.payload;
            replies.extend(transition.reply);

            for effect in transition.effects {
                match effect {
                    PaymentEffect::CreateLink { service, amount } => {
                        let description = self
                            .settings
                            .catalog
                            .service_by_code(&service)
                            .map(|s| s.name.clone())
                            .unwrap_or_else(|| service.clone());
                        let request = PaymentLinkRequest {
                            user_id: ctx.user_id.clone(),
                            service_code: service,
                            description,
                            amount,
                        };
                        let link = with_retry(&self.retry, "payment.create_link", || {
                            self.payments.create_payment_link(request.clone())
                        })
                        .await?;
                        tracing::info!(
                            user_id = %ctx.user_id,
                            reference = %link.reference,
                            amount,
                            "payment link issued"
                        );
                        next = Some(PaymentEvent::LinkCreated {
                            url: link.url,
                            reference: link.reference,
                        });
                    }
                    PaymentEffect::RecordReceipt(receipt) => {
                        tracing::info!(
                            user_id = %ctx.user_id,
                            reference = %receipt.reference,
                            "payment proof recorded"
                        );
                        if ctx.quote.as_ref().is_some_and(|q| q.service == receipt.service) {
                            ctx.quote = None;
                        }
                        if !ctx.receipts.iter().any(|r| r.reference == receipt.reference) {
                            ctx.receipts.push(receipt);
                        }
                    }
                }
            }
        }

        ctx.flow = Flow::Payment { state, payload };
        Ok(StepOutcome::reply(combine(replies)))
    }
}
