//! Context Store Port - persistence of conversation contexts.
//!
//! One document per user. `set` merges at the top level: fields present in
//! the written record replace stored ones, fields the engine does not know
//! about are left untouched. Concurrent writers for one user are
//! last-write-wins; the orchestrator serializes them per user.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::conversation::{ContextStack, ConversationContext, Flow, Turn, Workflow};
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::payment::{PaymentReceipt, Quote};
use crate::domain::scheduling::BookedAppointment;

/// Errors that can occur during context store operations.
#[derive(Debug, thiserror::Error)]
pub enum ContextStoreError {
    #[error("context store unavailable: {0}")]
    Unavailable(String),

    #[error("context store timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The stored document cannot be turned back into a context.
    #[error("corrupt context for {user_id}: {reason}")]
    Corrupt { user_id: String, reason: String },

    #[error("failed to serialize context: {0}")]
    Serialization(String),
}

impl ContextStoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ContextStoreError::Unavailable(_) | ContextStoreError::Timeout { .. }
        )
    }
}

/// Port for loading and saving contexts.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Loads the stored document, `None` for a user never seen.
    async fn get(&self, user_id: &UserId) -> Result<Option<StoredContext>, ContextStoreError>;

    /// Writes the record with top-level merge semantics.
    async fn set(&self, record: StoredContext) -> Result<(), ContextStoreError>;
}

/// A suspended workflow as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFrame {
    pub workflow: Workflow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fsm_state: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

/// The persisted shape of a [`ConversationContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredContext {
    pub user_id: UserId,
    #[serde(default)]
    pub workflow: Workflow,
    #[serde(default)]
    pub fsm_state: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub suspended_stack: Vec<StoredFrame>,
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default)]
    pub appointments: Vec<BookedAppointment>,
    #[serde(default)]
    pub receipts: Vec<PaymentReceipt>,
    #[serde(default)]
    pub quote: Option<Quote>,
    pub last_updated: Timestamp,
    /// Fields written by other systems, carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoredContext {
    pub fn from_context(context: &ConversationContext) -> Result<Self, ContextStoreError> {
        let payload = context
            .flow
            .payload_json()
            .map_err(|e| ContextStoreError::Serialization(e.to_string()))?;
        let suspended_stack = context
            .suspended
            .frames()
            .iter()
            .map(|frame| {
                Ok(StoredFrame {
                    workflow: frame.workflow(),
                    fsm_state: frame.state_name().map(str::to_string),
                    payload: frame
                        .payload_json()
                        .map_err(|e| ContextStoreError::Serialization(e.to_string()))?,
                })
            })
            .collect::<Result<Vec<_>, ContextStoreError>>()?;
        Ok(Self {
            user_id: context.user_id.clone(),
            workflow: context.flow.workflow(),
            fsm_state: context.flow.state_name().map(str::to_string),
            payload,
            suspended_stack,
            history: context.history.clone(),
            appointments: context.appointments.clone(),
            receipts: context.receipts.clone(),
            quote: context.quote.clone(),
            last_updated: context.last_updated,
            extra: Map::new(),
        })
    }

    /// Rebuilds the context, validating every workflow/state pair.
    pub fn into_context(self) -> Result<ConversationContext, ContextStoreError> {
        let user = self.user_id.as_str().to_string();
        let corrupt = |e: crate::domain::foundation::DomainError| ContextStoreError::Corrupt {
            user_id: user.clone(),
            reason: e.message,
        };
        let flow = Flow::from_parts(self.workflow, self.fsm_state.as_deref(), self.payload)
            .map_err(corrupt)?;
        let frames = self
            .suspended_stack
            .into_iter()
            .map(|f| Flow::from_parts(f.workflow, f.fsm_state.as_deref(), f.payload).map_err(corrupt))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ConversationContext {
            user_id: self.user_id,
            flow,
            suspended: ContextStack::from_frames(frames),
            history: self.history,
            appointments: self.appointments,
            receipts: self.receipts,
            quote: self.quote,
            last_updated: self.last_updated,
        })
    }

    /// Top-level fields of the document, as written by `set`.
    pub fn to_fields(&self) -> Result<Map<String, Value>, ContextStoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(_) => Err(ContextStoreError::Serialization(
                "context did not serialize to an object".to_string(),
            )),
            Err(e) => Err(ContextStoreError::Serialization(e.to_string())),
        }
    }

    /// Parses a stored document.
    pub fn from_fields(user_id: &UserId, fields: Map<String, Value>) -> Result<Self, ContextStoreError> {
        serde_json::from_value(Value::Object(fields)).map_err(|e| ContextStoreError::Corrupt {
            user_id: user_id.as_str().to_string(),
            reason: e.to_string(),
        })
    }
}
