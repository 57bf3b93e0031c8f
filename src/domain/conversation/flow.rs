//! The active workflow of a conversation as a tagged union.
//!
//! Each variant carries its own state enum and payload, so a machine only
//! ever sees the fields it owns. The flat `{workflow, fsm_state, payload}`
//! triple exists only at the storage boundary ([`Flow::from_parts`]).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::{DomainError, ErrorCode, StateMachine};
use crate::domain::payment::{PaymentPayload, PaymentState};
use crate::domain::scheduling::{SchedulingPayload, SchedulingState};
use crate::domain::verification::{VerificationPayload, VerificationState};

/// Discriminator of [`Flow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    #[default]
    None,
    Scheduling,
    Payment,
    Verification,
}

impl Workflow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Workflow::None => "none",
            Workflow::Scheduling => "scheduling",
            Workflow::Payment => "payment",
            Workflow::Verification => "verification",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "none" => Some(Workflow::None),
            "scheduling" => Some(Workflow::Scheduling),
            "payment" => Some(Workflow::Payment),
            "verification" => Some(Workflow::Verification),
            _ => None,
        }
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Flow {
    #[default]
    Idle,
    Scheduling {
        state: SchedulingState,
        payload: SchedulingPayload,
    },
    Payment {
        state: PaymentState,
        payload: PaymentPayload,
    },
    Verification {
        state: VerificationState,
        payload: VerificationPayload,
    },
}

impl Flow {
    pub fn workflow(&self) -> Workflow {
        match self {
            Flow::Idle => Workflow::None,
            Flow::Scheduling { .. } => Workflow::Scheduling,
            Flow::Payment { .. } => Workflow::Payment,
            Flow::Verification { .. } => Workflow::Verification,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Flow::Idle)
    }

    /// Persisted `fsm_state`; `None` when idle.
    pub fn state_name(&self) -> Option<&'static str> {
        match self {
            Flow::Idle => None,
            Flow::Scheduling { state, .. } => Some(state.name()),
            Flow::Payment { state, .. } => Some(state.name()),
            Flow::Verification { state, .. } => Some(state.name()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Flow::Idle => false,
            Flow::Scheduling { state, .. } => state.is_terminal(),
            Flow::Payment { state, .. } => state.is_terminal(),
            Flow::Verification { state, .. } => state.is_terminal(),
        }
    }

    /// Holds a confirmed booking or a payment in flight. Such a frame is
    /// never evicted from the suspended stack by size pressure.
    pub fn is_critical(&self) -> bool {
        match self {
            Flow::Scheduling { payload, .. } => payload.holds_booking(),
            Flow::Payment { state, payload } => state.in_flight() || payload.reference.is_some(),
            Flow::Idle | Flow::Verification { .. } => false,
        }
    }

    /// Payload as stored.
    pub fn payload_json(&self) -> Result<Value, serde_json::Error> {
        match self {
            Flow::Idle => Ok(Value::Object(Default::default())),
            Flow::Scheduling { payload, .. } => serde_json::to_value(payload),
            Flow::Payment { payload, .. } => serde_json::to_value(payload),
            Flow::Verification { payload, .. } => serde_json::to_value(payload),
        }
    }

    /// Rebuilds a flow from its stored triple.
    ///
    /// A state that does not belong to the named workflow, or a payload of
    /// the wrong shape, is a corrupt record.
    pub fn from_parts(workflow: Workflow, state: Option<&str>, payload: Value) -> Result<Self, DomainError> {
        fn state_of<S: StateMachine>(workflow: Workflow, raw: Option<&str>) -> Result<S, DomainError> {
            let raw = raw.unwrap_or_default();
            S::parse(raw).ok_or_else(|| {
                DomainError::new(
                    ErrorCode::ContextCorrupt,
                    format!("'{}' is not a {} state", raw, workflow),
                )
            })
        }
        fn payload_of<P: serde::de::DeserializeOwned>(
            workflow: Workflow,
            payload: Value,
        ) -> Result<P, DomainError> {
            // a missing payload is an empty one
            let payload = if payload.is_null() {
                Value::Object(Default::default())
            } else {
                payload
            };
            serde_json::from_value(payload).map_err(|e| {
                DomainError::new(
                    ErrorCode::ContextCorrupt,
                    format!("invalid {} payload: {}", workflow, e),
                )
            })
        }

        Ok(match workflow {
            Workflow::None => Flow::Idle,
            Workflow::Scheduling => Flow::Scheduling {
                state: state_of(workflow, state)?,
                payload: payload_of(workflow, payload)?,
            },
            Workflow::Payment => Flow::Payment {
                state: state_of(workflow, state)?,
                payload: payload_of(workflow, payload)?,
            },
            Workflow::Verification => Flow::Verification {
                state: state_of(workflow, state)?,
                payload: payload_of(workflow, payload)?,
            },
        })
    }
}
