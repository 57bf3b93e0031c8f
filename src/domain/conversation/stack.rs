//! Bounded stack of suspended workflows.

use super::flow::{Flow, Workflow};

/// Result of [`ContextStack::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The frame is on the stack; `evicted` names a frame dropped to make room.
    Pushed { evicted: Option<Workflow> },
    /// Every frame is critical and the stack is full; the flow is handed back.
    Rejected(Flow),
}

/// Suspended workflows, most recent last.
///
/// Never holds more than the cap given to [`ContextStack::push`]. When full,
/// the oldest non-critical frame makes room.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextStack {
    frames: Vec<Flow>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a stack from stored frames, oldest first.
    pub fn from_frames(frames: Vec<Flow>) -> Self {
        Self {
            frames: frames.into_iter().filter(|f| !f.is_idle()).collect(),
        }
    }

    pub fn push(&mut self, flow: Flow, cap: usize) -> PushOutcome {
        if flow.is_idle() {
            return PushOutcome::Pushed { evicted: None };
        }
        if cap == 0 {
            return PushOutcome::Rejected(flow);
        }
        let mut evicted = None;
        while self.frames.len() >= cap {
            match self.frames.iter().position(|f| !f.is_critical()) {
                Some(index) => evicted = Some(self.frames.remove(index).workflow()),
                None => return PushOutcome::Rejected(flow),
            }
        }
        self.frames.push(flow);
        PushOutcome::Pushed { evicted }
    }

    pub fn pop(&mut self) -> Option<Flow> {
        self.frames.pop()
    }

    /// Drops every frame that is not critical, returning how many went.
    pub fn retain_critical(&mut self) -> usize {
        let before = self.frames.len();
        self.frames.retain(Flow::is_critical);
        before - self.frames.len()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames, oldest first.
    pub fn frames(&self) -> &[Flow] {
        &self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{PaymentPayload, PaymentState};
    use crate::domain::scheduling::{SchedulingPayload, SchedulingState};
    use crate::domain::verification::{VerificationPayload, VerificationState};
    use proptest::prelude::*;

    fn browsing() -> Flow {
        Flow::Scheduling {
            state: SchedulingState::OfferingSlots,
            payload: SchedulingPayload::default(),
        }
    }

    fn paying() -> Flow {
        Flow::Payment {
            state: PaymentState::AwaitingProof,
            payload: PaymentPayload {
                reference: Some("cs_1".to_string()),
                ..PaymentPayload::default()
            },
        }
    }

    fn verifying() -> Flow {
        Flow::Verification {
            state: VerificationState::IdentifyPatient,
            payload: VerificationPayload::default(),
        }
    }

    #[test]
    fn push_and_pop_are_lifo() {
        let mut stack = ContextStack::new();
        stack.push(browsing(), 5);
        stack.push(verifying(), 5);
        assert_eq!(stack.pop(), Some(verifying()));
        assert_eq!(stack.pop(), Some(browsing()));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn full_stack_evicts_oldest_non_critical() {
        let mut stack = ContextStack::new();
        stack.push(paying(), 2);
        stack.push(browsing(), 2);
        let outcome = stack.push(verifying(), 2);
        assert_eq!(
            outcome,
            PushOutcome::Pushed {
                evicted: Some(Workflow::Scheduling)
            }
        );
        assert_eq!(stack.frames(), &[paying(), verifying()]);
    }

    #[test]
    fn full_stack_of_critical_frames_rejects() {
        let mut stack = ContextStack::new();
        stack.push(paying(), 1);
        assert_eq!(stack.push(browsing(), 1), PushOutcome::Rejected(browsing()));
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn retain_critical_keeps_payments_in_flight() {
        let mut stack = ContextStack::new();
        stack.push(browsing(), 3);
        stack.push(paying(), 3);
        stack.push(verifying(), 3);
        assert_eq!(stack.retain_critical(), 2);
        assert_eq!(stack.frames(), &[paying()]);
    }

    #[test]
    fn idle_is_never_stacked() {
        let mut stack = ContextStack::new();
        stack.push(Flow::Idle, 3);
        assert!(stack.is_empty());
    }

    proptest! {
        #[test]
        fn length_never_exceeds_cap(kinds in prop::collection::vec(0u8..3, 0..30), cap in 1usize..6) {
            let mut stack = ContextStack::new();
            for kind in kinds {
                let flow = match kind {
                    0 => browsing(),
                    1 => paying(),
                    _ => verifying(),
                };
                stack.push(flow, cap);
                prop_assert!(stack.len() <= cap);
            }
        }
    }
}
