//! Output of a pure workflow step.

use super::message::Reply;

/// Result of feeding one event to a workflow machine.
///
/// Machines never perform I/O. Anything that touches the outside world is
/// listed in `effects` for the execution shell to carry out; results come
/// back to the machine as further events.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<S, P, E> {
    pub state: S,
    pub payload: P,
    pub reply: Option<Reply>,
    pub effects: Vec<E>,
}

impl<S, P, E> Transition<S, P, E> {
    /// Moves to `state` with `payload`, saying nothing yet.
    pub fn to(state: S, payload: P) -> Self {
        Self {
            state,
            payload,
            reply: None,
            effects: Vec::new(),
        }
    }

    pub fn reply(mut self, reply: Reply) -> Self {
        self.reply = Some(reply);
        self
    }

    pub fn effect(mut self, effect: E) -> Self {
        self.effects.push(effect);
        self
    }
}
