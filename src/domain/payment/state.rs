//! Payment workflow states and payload.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{StateMachine, Timestamp};

/// Position of a user inside the payment workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    #[default]
    SelectingService,
    ConfirmingService,
    LinkIssued,
    AwaitingProof,
    Recorded,
}

impl PaymentState {
    pub const ALL: [PaymentState; 5] = [
        PaymentState::SelectingService,
        PaymentState::ConfirmingService,
        PaymentState::LinkIssued,
        PaymentState::AwaitingProof,
        PaymentState::Recorded,
    ];

    /// A link was issued and the money may already be moving.
    pub fn in_flight(&self) -> bool {
        matches!(self, PaymentState::LinkIssued | PaymentState::AwaitingProof)
    }
}

impl StateMachine for PaymentState {
    fn name(&self) -> &'static str {
        match self {
            PaymentState::SelectingService => "selecting_service",
            PaymentState::ConfirmingService => "confirming_service",
            PaymentState::LinkIssued => "link_issued",
            PaymentState::AwaitingProof => "awaiting_proof",
            PaymentState::Recorded => "recorded",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentState::*;
        match self {
            SelectingService => vec![ConfirmingService],
            ConfirmingService => vec![LinkIssued, SelectingService],
            // an image straight after the link is already the proof
            LinkIssued => vec![AwaitingProof, Recorded],
            AwaitingProof => vec![Recorded],
            Recorded => vec![],
        }
    }
}

/// Fields the payment workflow carries between turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PaymentPayload {
    /// Catalog code of the service being paid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// CLP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
    /// Provider reference of the issued link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Media reference or text the patient sent as proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<String>,
}

/// Proof of payment accepted for a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub reference: String,
    pub service: String,
    pub amount: u32,
    pub proof: String,
    pub recorded_at: Timestamp,
}

/// Amount agreed for a service by a coverage verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub service: String,
    pub amount: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for state in PaymentState::ALL {
            assert_eq!(PaymentState::parse(state.name()), Some(state));
        }
    }

    #[test]
    fn recorded_is_terminal_and_never_goes_back() {
        assert!(PaymentState::Recorded.is_terminal());
        assert!(!PaymentState::Recorded.can_transition_to(&PaymentState::AwaitingProof));
        assert!(PaymentState::LinkIssued.can_transition_to(&PaymentState::Recorded));
    }
}
