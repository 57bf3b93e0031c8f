//! Conversation handlers.

mod handle_message;

pub use handle_message::{Collaborators, EngineSettings, HandleMessageHandler};
