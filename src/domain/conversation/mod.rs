//! Conversation domain module.
//!
//! Holds the per-user context, the active workflow as a tagged union, the
//! stack of suspended workflows and the inbound/outbound message model.

mod context;
mod flow;
mod message;
mod stack;
pub mod text;
mod transition;

pub use context::{ConversationContext, Turn, TurnRole};
pub use flow::{Flow, Workflow};
pub use message::{
    Button, InboundMessage, Interactive, ListRow, MessageKind, OutboundPayload, Reply, UserInput,
    MAX_BUTTONS, MAX_BUTTON_TITLE, MAX_LIST_ROWS, MAX_LIST_TITLE, MAX_ROW_DESCRIPTION,
    MAX_ROW_TITLE,
};
pub use stack::{ContextStack, PushOutcome};
pub use transition::Transition;
