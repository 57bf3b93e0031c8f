//! Domain router: decides which workflow handles a message.
//!
//! Deterministic rules run first (exit commands, selection prefixes, the
//! keyword table). Only a message no rule can place reaches the classifier,
//! and a classifier that fails or answers something unexpected falls back
//! to scheduling.

use std::sync::Arc;

use crate::application::retry::{with_retry, RetryPolicy};
use crate::application::workflows::WorkflowSettings;
use crate::domain::conversation::text::is_question;
use crate::domain::conversation::{ConversationContext, TurnRole, UserInput, Workflow};
use crate::domain::decision::SERVICE_PREFIX;
use crate::domain::foundation::Timestamp;
use crate::domain::routing::{
    is_exit_command, is_resume_command, match_rules, workflow_for_selection, StartIntent,
};
use crate::ports::{AIProvider, CompletionRequest, MessageRole, RequestMetadata};

/// Turns of history handed to the classifier.
const CLASSIFIER_HISTORY: usize = 6;

const CLASSIFIER_PROMPT: &str = "Clasificas mensajes de pacientes de una clínica. \
Responde solo con una palabra: \"scheduling\" si la persona quiere agendar, cambiar o \
cancelar una hora, o \"payment\" si quiere pagar.";

/// Where a message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Abandon the active workflow (`Workflow::None` clears suspended ones).
    Exit(Workflow),
    /// Feed the message to the active workflow.
    Continue(Workflow),
    /// Start a workflow, suspending the active one if it differs.
    Start(Workflow, StartIntent),
    /// Suspend the active workflow and answer an unrelated question.
    Interrupt,
    /// Bring back the most recently suspended workflow.
    Resume,
    /// Answer a question with nothing active.
    Inquiry,
}

pub struct DomainRouter {
    ai: Arc<dyn AIProvider>,
    settings: Arc<WorkflowSettings>,
    retry: RetryPolicy,
}

impl DomainRouter {
    pub fn new(ai: Arc<dyn AIProvider>, settings: Arc<WorkflowSettings>, retry: RetryPolicy) -> Self {
        Self { ai, settings, retry }
    }

    pub async fn route(&self, ctx: &ConversationContext, input: &UserInput) -> RouteDecision {
        let decision = match ctx.flow.workflow() {
            Workflow::None => self.route_idle(ctx, input).await,
            active => self.route_active(ctx, input, active),
        };
        tracing::debug!(
            user_id = %ctx.user_id,
            workflow = %ctx.flow.workflow(),
            decision = ?decision,
            "routed message"
        );
        decision
    }

    fn route_active(
        &self,
        ctx: &ConversationContext,
        input: &UserInput,
        active: Workflow,
    ) -> RouteDecision {
        if input.is_selection() {
            return match workflow_for_selection(&input.raw) {
                Some(owner) if owner != active && !input.raw.starts_with(SERVICE_PREFIX) => {
                    match StartIntent::for_workflow(owner) {
                        Some(intent) => RouteDecision::Start(owner, intent),
                        None => RouteDecision::Continue(active),
                    }
                }
                _ => RouteDecision::Continue(active),
            };
        }
        if is_exit_command(&input.normalized) {
            return RouteDecision::Exit(active);
        }
        // an answer the current step can use never switches workflows
        if self.settings.understands(ctx, input, Timestamp::now()) {
            return RouteDecision::Continue(active);
        }
        if let Some(intent) = match_rules(&input.normalized).and_then(|rule| rule.intent) {
            if intent.workflow() != active {
                return RouteDecision::Start(intent.workflow(), intent);
            }
        }
        if is_question(&input.raw) {
            return RouteDecision::Interrupt;
        }
        // the machine re-prompts
        RouteDecision::Continue(active)
    }

    async fn route_idle(&self, ctx: &ConversationContext, input: &UserInput) -> RouteDecision {
        let suspended = !ctx.suspended.is_empty();

        if is_exit_command(&input.normalized) {
            return RouteDecision::Exit(Workflow::None);
        }
        if is_resume_command(&input.raw, &input.normalized) {
            return if suspended {
                RouteDecision::Resume
            } else {
                RouteDecision::Inquiry
            };
        }
        if input.is_selection() {
            if let Some(owner) = workflow_for_selection(&input.raw) {
                if let Some(intent) = StartIntent::for_workflow(owner) {
                    return RouteDecision::Start(owner, intent);
                }
            }
        }
        let rule = match_rules(&input.normalized);
        if let Some(intent) = rule.and_then(|rule| rule.intent) {
            return RouteDecision::Start(intent.workflow(), intent);
        }
        if is_question(&input.raw) {
            return RouteDecision::Inquiry;
        }
        if suspended && rule.is_none() {
            return RouteDecision::Resume;
        }
        let workflow = self.classify(ctx, input).await;
        match StartIntent::for_workflow(workflow) {
            Some(intent) => RouteDecision::Start(workflow, intent),
            None => RouteDecision::Start(Workflow::Scheduling, StartIntent::Book),
        }
    }

    /// Asks the classifier for scheduling or payment.
    async fn classify(&self, ctx: &ConversationContext, input: &UserInput) -> Workflow {
        let mut request = CompletionRequest::new(RequestMetadata::new(ctx.user_id.clone(), "classify"))
            .with_system_prompt(CLASSIFIER_PROMPT)
            .with_max_tokens(5)
            .with_temperature(0.0);
        let skip = ctx.history.len().saturating_sub(CLASSIFIER_HISTORY);
        for turn in &ctx.history[skip..] {
            let role = match turn.role {
                TurnRole::User => MessageRole::User,
                TurnRole::Assistant => MessageRole::Assistant,
            };
            request = request.with_message(role, turn.text.clone());
        }
        if ctx.history.last().map(|t| t.text.as_str()) != Some(input.raw.as_str()) {
            request = request.with_message(MessageRole::User, input.raw.clone());
        }

        let answer = with_retry(&self.retry, "ai.classify", || self.ai.complete(request.clone())).await;
        match answer {
            Ok(response) => parse_label(&response.content),
            Err(err) => {
                tracing::warn!(user_id = %ctx.user_id, error = %err, "classifier failed, defaulting to scheduling");
                Workflow::Scheduling
            }
        }
    }
}

/// Only scheduling and payment are accepted; anything else is scheduling.
fn parse_label(raw: &str) -> Workflow {
    let label = raw.trim().trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
    match label.as_str() {
        "payment" | "pago" | "pagar" => Workflow::Payment,
        _ => Workflow::Scheduling,
    }
}
