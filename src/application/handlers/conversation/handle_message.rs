//! HandleMessage handler: the orchestrator.
//!
//! One inbound message is one turn. The turn holds the user's lock from
//! load to persist, so turns of one user never interleave while turns of
//! different users run in parallel.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::application::availability_cache::AvailabilityCache;
use crate::application::inquiry::InquiryResponder;
use crate::application::retry::{with_retry, RetryPolicy};
use crate::application::routing::{DomainRouter, RouteDecision};
use crate::application::user_locks::UserLocks;
use crate::application::workflows::{
    PaymentWorkflow, SchedulingWorkflow, StepOutcome, VerificationWorkflow, WorkflowError,
    WorkflowSettings,
};
use crate::domain::conversation::{
    ConversationContext, InboundMessage, MessageKind, OutboundPayload, PushOutcome,
    Reply, TurnRole, UserInput, Workflow,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::routing::{StartIntent, RESUME_ID};
use crate::domain::scheduling::SchedulingIntent;
use crate::domain::verification::Handoff;
use crate::ports::{
    AIProvider, CalendarProvider, ContextStore, ContextStoreError, PatientRegistry,
    PaymentProvider, StoredContext,
};

/// External services the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ContextStore>,
    pub ai: Arc<dyn AIProvider>,
    pub calendar: Arc<dyn CalendarProvider>,
    pub registry: Arc<dyn PatientRegistry>,
    pub payments: Arc<dyn PaymentProvider>,
}

/// Engine tuning, resolved from configuration.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub workflow: WorkflowSettings,
    pub clinic_name: String,
    pub retry: RetryPolicy,
    pub cache_ttl: Duration,
    /// Most workflows one user may have suspended at once.
    pub stack_cap: usize,
    /// Turns of history kept per user.
    pub history_limit: usize,
}

pub struct HandleMessageHandler {
    store: Arc<dyn ContextStore>,
    locks: UserLocks,
    router: DomainRouter,
    inquiry: InquiryResponder,
    scheduling: SchedulingWorkflow,
    payment: PaymentWorkflow,
    verification: VerificationWorkflow,
    settings: Arc<WorkflowSettings>,
    retry: RetryPolicy,
    stack_cap: usize,
    history_limit: usize,
}

impl HandleMessageHandler {
    pub fn new(collaborators: Collaborators, engine: EngineSettings) -> Self {
        let settings = Arc::new(engine.workflow);
        let cache = Arc::new(AvailabilityCache::new(engine.cache_ttl));
        Self {
            store: collaborators.store,
            locks: UserLocks::new(),
            router: DomainRouter::new(
                Arc::clone(&collaborators.ai),
                Arc::clone(&settings),
                engine.retry,
            ),
            inquiry: InquiryResponder::new(
                collaborators.ai,
                Arc::clone(&settings.catalog),
                engine.clinic_name,
                settings.human_contact.clone(),
                engine.retry,
            ),
            scheduling: SchedulingWorkflow::new(
                collaborators.calendar,
                cache,
                Arc::clone(&settings),
                engine.retry,
            ),
            payment: PaymentWorkflow::new(
                collaborators.payments,
                Arc::clone(&settings),
                engine.retry,
            ),
            verification: VerificationWorkflow::new(
                collaborators.registry,
                Arc::clone(&settings),
                engine.retry,
            ),
            settings,
            retry: engine.retry,
            stack_cap: engine.stack_cap,
            history_limit: engine.history_limit,
        }
    }

    /// Runs one turn and returns what to send back.
    ///
    /// Never fails: every fault ends in a reply the user can act on.
    pub async fn handle(&self, message: InboundMessage) -> OutboundPayload {
        let user_id = message.user_id.clone();
        let _guard = self.locks.acquire(&user_id).await;

        let mut ctx = match self.load(&user_id).await {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "context store unavailable");
                return OutboundPayload::new(user_id, self.technical_difficulty());
            }
        };

        let input = UserInput::from(&message);
        if message.kind == MessageKind::Audio && input.raw.is_empty() {
            let reply = Reply::text("No alcancé a entender el audio. ¿Me lo puedes escribir?");
            return OutboundPayload::new(user_id, reply);
        }

        let before = ctx.clone();
        ctx.record_turn(TurnRole::User, input.raw.clone(), self.history_limit);

        let dispatched = AssertUnwindSafe(self.dispatch(&mut ctx, &input))
            .catch_unwind()
            .await;
        let mut reply = match dispatched {
            Ok(Ok(reply)) => reply,
            Ok(Err(WorkflowError::Transient(err))) => {
                tracing::warn!(
                    user_id = %user_id,
                    workflow = %before.flow.workflow(),
                    error = %err,
                    "external service failed, turn rolled back"
                );
                let history = std::mem::take(&mut ctx.history);
                ctx = before;
                ctx.history = history;
                self.technical_difficulty()
            }
            Ok(Err(WorkflowError::Invariant(err))) => {
                tracing::error!(
                    user_id = %user_id,
                    workflow = %ctx.flow.workflow(),
                    fsm_state = ?ctx.flow.state_name(),
                    error = %err,
                    "workflow invariant broken, flow reset"
                );
                ctx.reset_flow();
                self.technical_difficulty()
            }
            Err(_panic) => {
                tracing::error!(
                    user_id = %user_id,
                    workflow = %before.flow.workflow(),
                    "workflow panicked, flow reset"
                );
                let history = std::mem::take(&mut ctx.history);
                ctx = before;
                ctx.history = history;
                ctx.reset_flow();
                self.technical_difficulty()
            }
        };

        if ctx.flow.is_terminal() {
            tracing::info!(
                user_id = %user_id,
                workflow = %ctx.flow.workflow(),
                fsm_state = ?ctx.flow.state_name(),
                "workflow finished"
            );
            ctx.reset_flow();
            if !ctx.suspended.is_empty() && reply.interactive.is_none() {
                reply = reply
                    .followed_by(Reply::text("¿Seguimos con lo que teníamos pendiente?"))
                    .with_buttons(vec![(RESUME_ID, "Continuar")]);
            }
        }

        ctx.record_turn(TurnRole::Assistant, reply.text.clone(), self.history_limit);
        ctx.touch();
        if let Err(err) = self.persist(&ctx).await {
            // the reply still goes out: external effects of this turn already happened
            tracing::error!(user_id = %user_id, error = %err, "failed to persist context");
        }

        tracing::debug!(
            user_id = %user_id,
            workflow = %ctx.flow.workflow(),
            fsm_state = ?ctx.flow.state_name(),
            suspended = ctx.suspended.len(),
            "turn complete"
        );
        OutboundPayload::new(user_id, reply)
    }

    async fn load(&self, user_id: &UserId) -> Result<ConversationContext, ContextStoreError> {
        let stored = with_retry(&self.retry, "store.get", || self.store.get(user_id)).await;
        let restored = match stored {
            Ok(None) => return Ok(ConversationContext::new(user_id.clone())),
            Ok(Some(stored)) => stored.into_context(),
            Err(err) => Err(err),
        };
        match restored {
            Ok(ctx) => Ok(ctx),
            Err(ContextStoreError::Corrupt { reason, .. }) => {
                tracing::error!(user_id = %user_id, reason = %reason, "corrupt context, starting over");
                Ok(ConversationContext::new(user_id.clone()))
            }
            Err(err) => Err(err),
        }
    }

    async fn persist(&self, ctx: &ConversationContext) -> Result<(), ContextStoreError> {
        let record = StoredContext::from_context(ctx)?;
        with_retry(&self.retry, "store.set", || self.store.set(record.clone())).await
    }

    async fn dispatch(
        &self,
        ctx: &mut ConversationContext,
        input: &UserInput,
    ) -> Result<Reply, WorkflowError> {
        let decision = self.router.route(ctx, input).await;
        match decision {
            RouteDecision::Exit(Workflow::None) => {
                ctx.reset_flow();
                let dropped = ctx.suspended.retain_critical();
                if ctx.suspended.is_empty() {
                    return Ok(Reply::text("Listo, dejamos todo hasta aquí.")
                        .followed_by(self.inquiry.menu()));
                }
                tracing::info!(
                    user_id = %ctx.user_id,
                    dropped,
                    kept = ctx.suspended.len(),
                    "exit kept critical frames"
                );
                Ok(Reply::text(
                    "Listo, dejamos lo demás hasta aquí. Tu pago u hora confirmada sigue pendiente \
                     y la puedes retomar cuando quieras.",
                )
                .with_buttons(vec![(RESUME_ID, "Continuar")]))
            }
            RouteDecision::Exit(active) => {
                tracing::info!(user_id = %ctx.user_id, workflow = %active, "workflow abandoned");
                ctx.reset_flow();
                let reply = Reply::text("Listo, lo dejamos hasta aquí.");
                if ctx.suspended.is_empty() {
                    Ok(reply.followed_by(self.inquiry.menu()))
                } else {
                    Ok(reply
                        .followed_by(Reply::text("¿Seguimos con lo que teníamos pendiente?"))
                        .with_buttons(vec![(RESUME_ID, "Continuar")]))
                }
            }
            RouteDecision::Continue(workflow) => self.step(ctx, workflow, input).await,
            RouteDecision::Start(workflow, intent) => {
                let active = ctx.flow.workflow();
                if active != Workflow::None && active != workflow {
                    match ctx.suspend_active(self.stack_cap) {
                        PushOutcome::Pushed { evicted } => {
                            tracing::info!(
                                user_id = %ctx.user_id,
                                suspended = %active,
                                evicted = ?evicted,
                                starting = %workflow,
                                "workflow suspended"
                            );
                        }
                        PushOutcome::Rejected(_) => return Ok(self.stack_full(ctx)),
                    }
                }
                self.start(ctx, intent, input).await
            }
            RouteDecision::Interrupt => {
                let active = ctx.flow.workflow();
                match ctx.suspend_active(self.stack_cap) {
                    PushOutcome::Pushed { evicted } => {
                        tracing::info!(
                            user_id = %ctx.user_id,
                            suspended = %active,
                            evicted = ?evicted,
                            "workflow interrupted by a question"
                        );
                        Ok(self.inquiry.answer(ctx, input).await)
                    }
                    PushOutcome::Rejected(_) => {
                        // answer anyway, then ask the pending question again
                        let answer = self.inquiry.answer(ctx, input).await;
                        let prompt = self.settings.prompt(ctx, Timestamp::now()).unwrap_or_default();
                        Ok(answer.followed_by(prompt))
                    }
                }
            }
            RouteDecision::Resume => {
                if ctx.resume() {
                    tracing::info!(
                        user_id = %ctx.user_id,
                        workflow = %ctx.flow.workflow(),
                        fsm_state = ?ctx.flow.state_name(),
                        "workflow resumed"
                    );
                    let prompt = self.settings.prompt(ctx, Timestamp::now()).unwrap_or_default();
                    Ok(Reply::text("Sigamos donde quedamos.").followed_by(prompt))
                } else {
                    Ok(self.inquiry.menu())
                }
            }
            RouteDecision::Inquiry => Ok(self.inquiry.answer(ctx, input).await),
        }
    }

    async fn step(
        &self,
        ctx: &mut ConversationContext,
        workflow: Workflow,
        input: &UserInput,
    ) -> Result<Reply, WorkflowError> {
        let outcome = match workflow {
            Workflow::Scheduling => self.scheduling.step(ctx, input.clone()).await?,
            Workflow::Payment => self.payment.step(ctx, input.clone()).await?,
            Workflow::Verification => self.verification.step(ctx, input.clone()).await?,
            Workflow::None => return Ok(self.inquiry.menu()),
        };
        self.follow(ctx, outcome).await
    }

    async fn start(
        &self,
        ctx: &mut ConversationContext,
        intent: StartIntent,
        input: &UserInput,
    ) -> Result<Reply, WorkflowError> {
        tracing::info!(user_id = %ctx.user_id, intent = ?intent, "workflow started");
        let input = Some(input.clone());
        let outcome = match intent {
            StartIntent::Book => {
                self.scheduling
                    .start(ctx, SchedulingIntent::Book, None, None, input)
                    .await?
            }
            StartIntent::Cancel => {
                self.scheduling
                    .start(ctx, SchedulingIntent::Cancel, None, None, input)
                    .await?
            }
            StartIntent::Reschedule => {
                self.scheduling
                    .start(ctx, SchedulingIntent::Reschedule, None, None, input)
                    .await?
            }
            StartIntent::Pay => self.payment.start(ctx, None, input).await?,
            StartIntent::Verify => self.verification.start(ctx, None, input).await?,
        };
        self.follow(ctx, outcome).await
    }

    /// Starts scheduling in the same turn when verification hands off.
    async fn follow(
        &self,
        ctx: &mut ConversationContext,
        outcome: StepOutcome,
    ) -> Result<Reply, WorkflowError> {
        let Some(Handoff {
            service, patient, ..
        }) = outcome.handoff
        else {
            return Ok(outcome.reply);
        };
        tracing::info!(user_id = %ctx.user_id, service = %service, "verification handed off to scheduling");
        let next = self
            .scheduling
            .start(ctx, SchedulingIntent::Book, Some(service), Some(patient), None)
            .await?;
        Ok(outcome.reply.followed_by(next.reply))
    }

    fn stack_full(&self, ctx: &ConversationContext) -> Reply {
        tracing::warn!(
            user_id = %ctx.user_id,
            workflow = %ctx.flow.workflow(),
            suspended = ctx.suspended.len(),
            "suspension rejected, pending work is all critical"
        );
        let prompt = self.settings.prompt(ctx, Timestamp::now()).unwrap_or_default();
        Reply::text(
            "Tienes varios trámites pendientes. Terminemos este primero o escribe \"salir\" para dejarlo.",
        )
        .followed_by(prompt)
    }

    fn technical_difficulty(&self) -> Reply {
        Reply::text(format!(
            "Estamos con problemas técnicos en este momento. Intenta de nuevo en unos minutos \
             o escríbenos a {}.",
            self.settings.human_contact
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::MockAIProvider;
    use crate::adapters::calendar::InMemoryCalendar;
    use crate::adapters::payment::MockPaymentProvider;
    use crate::adapters::registry::InMemoryPatientRegistry;
    use crate::adapters::storage::InMemoryContextStore;
    use crate::domain::conversation::Flow;
    use crate::domain::decision::ServiceCatalog;
    use crate::domain::scheduling::SchedulingState;
    use chrono::FixedOffset;

    struct Fixture {
        store: Arc<InMemoryContextStore>,
        calendar: Arc<InMemoryCalendar>,
        handler: HandleMessageHandler,
    }

    fn fixture() -> Fixture {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let store = Arc::new(InMemoryContextStore::new());
        let calendar = Arc::new(InMemoryCalendar::new(offset));
        let collaborators = Collaborators {
            store: store.clone(),
            ai: Arc::new(MockAIProvider::new().with_response("scheduling")),
            calendar: calendar.clone(),
            registry: Arc::new(InMemoryPatientRegistry::new(Vec::new())),
            payments: Arc::new(MockPaymentProvider::new()),
        };
        let engine = EngineSettings {
            workflow: WorkflowSettings {
                catalog: Arc::new(ServiceCatalog::embedded().unwrap()),
                offset,
                slot_limit: 5,
                search_days: 14,
                human_contact: "+56 2 2345 6789".to_string(),
            },
            clinic_name: "Clínica Demo".to_string(),
            retry: RetryPolicy::no_retry(Duration::from_secs(2)),
            cache_ttl: Duration::from_secs(60),
            stack_cap: 5,
            history_limit: 10,
        };
        Fixture {
            store,
            calendar,
            handler: HandleMessageHandler::new(collaborators, engine),
        }
    }

    fn user() -> UserId {
        UserId::new("+56911112222").unwrap()
    }

    async fn stored(store: &InMemoryContextStore) -> ConversationContext {
        store.get(&user()).await.unwrap().unwrap().into_context().unwrap()
    }

    #[tokio::test]
    async fn booking_request_offers_slots_and_persists() {
        let f = fixture();
        let out = f
            .handler
            .handle(InboundMessage::text(user(), "quiero agendar una hora"))
            .await;
        assert!(out.interactive.is_some());
        let ctx = stored(&f.store).await;
        assert!(matches!(
            ctx.flow,
            Flow::Scheduling {
                state: SchedulingState::OfferingSlots,
                ..
            }
        ));
        assert_eq!(ctx.history.len(), 2);
    }

    #[tokio::test]
    async fn calendar_outage_keeps_previous_state() {
        let f = fixture();
        f.calendar.set_unavailable(true);
        let out = f
            .handler
            .handle(InboundMessage::text(user(), "quiero agendar una hora"))
            .await;
        assert!(out.text.contains("+56 2 2345 6789"));
        let ctx = stored(&f.store).await;
        assert!(ctx.flow.is_idle());
    }

    #[tokio::test]
    async fn empty_audio_asks_for_text_without_writing() {
        let f = fixture();
        let out = f.handler.handle(InboundMessage::audio(user(), "  ")).await;
        assert!(out.text.contains("escribir"));
        assert!(f.store.get(&user()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn exit_goes_idle() {
        let f = fixture();
        f.handler
            .handle(InboundMessage::text(user(), "quiero agendar una hora"))
            .await;
        f.handler.handle(InboundMessage::text(user(), "salir")).await;
        let ctx = stored(&f.store).await;
        assert!(ctx.flow.is_idle());
    }
}
