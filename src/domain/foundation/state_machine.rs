//! State machine contract for workflow state enums.
//!
//! Every workflow (scheduling, payment, verification) keeps its position as
//! an enum implementing [`StateMachine`]. The persisted `fsm_state` string is
//! the enum's [`StateMachine::name`], and parsing it back is how the context
//! store proves a stored state is valid for its workflow.

use super::ValidationError;

/// Trait for workflow state enums.
///
/// Implementors define the edges of their graph; validated transitions
/// and terminal detection come for free.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for PaymentState {
///     fn name(&self) -> &'static str { ... }
///     fn parse(name: &str) -> Option<Self> { ... }
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             SelectingService => vec![ConfirmingService],
///             Recorded => vec![],
///             // ...
///         }
///     }
/// }
///
/// let next = current.transition_to(PaymentState::LinkIssued)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Stable snake_case name, as persisted in `fsm_state`.
    fn name(&self) -> &'static str;

    /// Inverse of [`StateMachine::name`].
    fn parse(name: &str) -> Option<Self>;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Returns true if transition from self to target is valid.
    ///
    /// Staying in the same state is always allowed (re-prompts).
    fn can_transition_to(&self, target: &Self) -> bool {
        self == target || self.valid_transitions().contains(target)
    }

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}
