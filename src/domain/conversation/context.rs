//! Per-user conversation context.

use serde::{Deserialize, Serialize};

use super::flow::Flow;
use super::stack::{ContextStack, PushOutcome};
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::payment::{PaymentReceipt, Quote};
use crate::domain::scheduling::BookedAppointment;

/// Who said a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One line of the rolling history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub at: Timestamp,
}

/// Everything the engine remembers about one user.
///
/// Created idle on the first message, mutated only by the orchestrator
/// while it holds the user's lock, and never deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationContext {
    pub user_id: UserId,
    pub flow: Flow,
    pub suspended: ContextStack,
    pub history: Vec<Turn>,
    pub appointments: Vec<BookedAppointment>,
    pub receipts: Vec<PaymentReceipt>,
    /// Amount agreed by the last coverage verdict.
    pub quote: Option<Quote>,
    pub last_updated: Timestamp,
}

impl ConversationContext {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            flow: Flow::Idle,
            suspended: ContextStack::new(),
            history: Vec::new(),
            appointments: Vec::new(),
            receipts: Vec::new(),
            quote: None,
            last_updated: Timestamp::now(),
        }
    }

    /// Appends a turn, keeping at most `limit` of them.
    pub fn record_turn(&mut self, role: TurnRole, text: impl Into<String>, limit: usize) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.history.push(Turn {
            role,
            text,
            at: Timestamp::now(),
        });
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }

    /// Moves the active flow onto the suspended stack and goes idle.
    ///
    /// On rejection the flow stays active.
    pub fn suspend_active(&mut self, cap: usize) -> PushOutcome {
        let active = std::mem::take(&mut self.flow);
        match self.suspended.push(active, cap) {
            PushOutcome::Rejected(flow) => {
                self.flow = flow.clone();
                PushOutcome::Rejected(flow)
            }
            pushed => pushed,
        }
    }

    /// Restores the most recently suspended flow. False when nothing is
    /// suspended.
    pub fn resume(&mut self) -> bool {
        match self.suspended.pop() {
            Some(flow) => {
                self.flow = flow;
                true
            }
            None => false,
        }
    }

    pub fn reset_flow(&mut self) {
        self.flow = Flow::Idle;
    }

    pub fn touch(&mut self) {
        self.last_updated = Timestamp::now();
    }
}
