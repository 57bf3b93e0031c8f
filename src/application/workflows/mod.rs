//! Execution shells for the workflow machines.
//!
//! A shell feeds one event to its pure machine, performs the effects the
//! machine asks for through the retry wrapper, and feeds the results back
//! until the machine has nothing left to do. The final state and payload
//! are written to the context's active flow.

mod payment;
mod scheduling;
mod verification;

pub use payment::PaymentWorkflow;
pub use scheduling::SchedulingWorkflow;
pub use verification::VerificationWorkflow;

use std::sync::Arc;

use chrono::FixedOffset;
use thiserror::Error;

use crate::domain::conversation::{ConversationContext, Flow, Reply, UserInput};
use crate::domain::decision::ServiceCatalog;
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::domain::payment::{machine as payment_machine, PaymentEnv, Quote};
use crate::domain::scheduling::{machine as scheduling_machine, BookedAppointment, SchedulingEnv};
use crate::domain::verification::{machine as verification_machine, Handoff, VerificationEnv};
use crate::ports::ExternalError;

/// Events one message may chain through a machine before the shell gives up.
const MAX_CHAINED_EVENTS: usize = 8;

/// Why a workflow step did not complete.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// An external service kept failing; the step can be retried later.
    #[error("external service failed: {0}")]
    Transient(#[from] ExternalError),

    /// The machine was asked to do something its state does not allow.
    #[error("workflow invariant broken: {0}")]
    Invariant(#[from] DomainError),
}

/// What a step produced for the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub reply: Reply,
    /// Set when verification finished and scheduling should start.
    pub handoff: Option<Handoff>,
}

impl StepOutcome {
    pub fn reply(reply: Reply) -> Self {
        Self {
            reply,
            handoff: None,
        }
    }
}

/// Clinic facts and limits every machine environment is built from.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub catalog: Arc<ServiceCatalog>,
    pub offset: FixedOffset,
    pub slot_limit: usize,
    pub search_days: u32,
    pub human_contact: String,
}

impl WorkflowSettings {
    pub fn scheduling_env<'a>(
        &'a self,
        appointments: &'a [BookedAppointment],
        now: Timestamp,
    ) -> SchedulingEnv<'a> {
        SchedulingEnv {
            now,
            offset: self.offset,
            slot_limit: self.slot_limit,
            appointments,
            human_contact: &self.human_contact,
        }
    }

    pub fn payment_env<'a>(&'a self, quote: Option<&'a Quote>, now: Timestamp) -> PaymentEnv<'a> {
        PaymentEnv {
            catalog: &self.catalog,
            now,
            quote,
        }
    }

    pub fn verification_env(&self, now: Timestamp) -> VerificationEnv<'_> {
        VerificationEnv {
            catalog: &self.catalog,
            today: now.date_in(self.offset),
            human_contact: &self.human_contact,
        }
    }

    /// Whether the active flow can act on `input`. Idle understands nothing.
    pub fn understands(&self, ctx: &ConversationContext, input: &UserInput, now: Timestamp) -> bool {
        match &ctx.flow {
            Flow::Idle => false,
            Flow::Scheduling { state, payload } => {
                scheduling_machine::understands(*state, payload, input, now.date_in(self.offset))
            }
            Flow::Payment { state, payload } => {
                let env = self.payment_env(ctx.quote.as_ref(), now);
                payment_machine::understands(*state, payload, input, &env)
            }
            Flow::Verification { state, payload } => {
                let env = self.verification_env(now);
                verification_machine::understands(*state, payload, input, &env)
            }
        }
    }

    /// The question the active flow is waiting on, re-rendered.
    pub fn prompt(&self, ctx: &ConversationContext, now: Timestamp) -> Option<Reply> {
        match &ctx.flow {
            Flow::Idle => None,
            Flow::Scheduling { state, payload } => {
                let env = self.scheduling_env(&ctx.appointments, now);
                Some(scheduling_machine::prompt(*state, payload, &env))
            }
            Flow::Payment { state, payload } => {
                let env = self.payment_env(ctx.quote.as_ref(), now);
                Some(payment_machine::prompt(*state, payload, &env))
            }
            Flow::Verification { state, payload } => {
                let env = self.verification_env(now);
                Some(verification_machine::prompt(*state, payload, &env))
            }
        }
    }
}

/// Joins the replies of chained events into one message.
fn combine(replies: Vec<Reply>) -> Reply {
    replies
        .into_iter()
        .fold(Reply::default(), |acc, next| acc.followed_by(next))
}

fn runaway(workflow: &str) -> DomainError {
    DomainError::new(
        ErrorCode::InternalError,
        format!("{} chained more than {} events", workflow, MAX_CHAINED_EVENTS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;
    use crate::domain::payment::{PaymentPayload, PaymentState};

    fn settings() -> WorkflowSettings {
        WorkflowSettings {
            catalog: Arc::new(ServiceCatalog::embedded().unwrap()),
            offset: FixedOffset::west_opt(3 * 3600).unwrap(),
            slot_limit: 5,
            search_days: 14,
            human_contact: "+56 2 2345 6789".to_string(),
        }
    }

    #[test]
    fn idle_has_no_prompt_and_understands_nothing() {
        let ctx = ConversationContext::new(UserId::new("+5691").unwrap());
        let settings = settings();
        assert!(settings.prompt(&ctx, Timestamp::now()).is_none());
        assert!(!settings.understands(&ctx, &UserInput::text("hola"), Timestamp::now()));
    }

    #[test]
    fn awaiting_proof_takes_any_text() {
        let mut ctx = ConversationContext::new(UserId::new("+5691").unwrap());
        ctx.flow = Flow::Payment {
            state: PaymentState::AwaitingProof,
            payload: PaymentPayload::default(),
        };
        let settings = settings();
        assert!(settings.understands(&ctx, &UserInput::text("listo, pagué"), Timestamp::now()));
        assert!(settings.prompt(&ctx, Timestamp::now()).is_some());
    }

    #[test]
    fn combine_keeps_last_interactive() {
        let first = Reply::text("uno").with_buttons(vec![("a", "A")]);
        let second = Reply::text("dos");
        let joined = combine(vec![first.clone(), second]);
        assert_eq!(joined.text, "uno\n\ndos");
        assert_eq!(joined.interactive, first.interactive);
    }
}
