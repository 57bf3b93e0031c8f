//! Verification workflow states and payload.

use serde::{Deserialize, Serialize};

use super::patient::{PatientField, PatientRecord};
use crate::domain::decision::Verdict;
use crate::domain::foundation::StateMachine;

/// Position of a user inside the verification workflow.
///
/// `IdentifyService → IdentifyPatient → CollectOrFetchPatientData →
/// ConfirmData → ComputeVerdict → Handoff`, with `HumanContact` as the
/// other way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    #[default]
    IdentifyService,
    IdentifyPatient,
    CollectOrFetchPatientData,
    ConfirmData,
    ComputeVerdict,
    Handoff,
    HumanContact,
}

impl VerificationState {
    pub const ALL: [VerificationState; 7] = [
        VerificationState::IdentifyService,
        VerificationState::IdentifyPatient,
        VerificationState::CollectOrFetchPatientData,
        VerificationState::ConfirmData,
        VerificationState::ComputeVerdict,
        VerificationState::Handoff,
        VerificationState::HumanContact,
    ];
}

impl StateMachine for VerificationState {
    fn name(&self) -> &'static str {
        match self {
            VerificationState::IdentifyService => "identify_service",
            VerificationState::IdentifyPatient => "identify_patient",
            VerificationState::CollectOrFetchPatientData => "collect_or_fetch_patient_data",
            VerificationState::ConfirmData => "confirm_data",
            VerificationState::ComputeVerdict => "compute_verdict",
            VerificationState::Handoff => "handoff",
            VerificationState::HumanContact => "human_contact",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use VerificationState::*;
        match self {
            IdentifyService => vec![IdentifyPatient],
            IdentifyPatient => vec![CollectOrFetchPatientData],
            // a one-off fix goes straight back to the verdict
            CollectOrFetchPatientData => vec![ConfirmData, ComputeVerdict],
            // "no" at the summary restarts the field walk
            ConfirmData => vec![ComputeVerdict, CollectOrFetchPatientData],
            ComputeVerdict => vec![Handoff, HumanContact, ConfirmData, CollectOrFetchPatientData],
            Handoff | HumanContact => vec![],
        }
    }
}

/// Where the patient data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatientSource {
    #[default]
    Collected,
    Registry,
}

/// Fields the verification workflow carries between turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VerificationPayload {
    /// Catalog code of the service being checked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default)]
    pub patient: PatientRecord,
    /// Field the next answer fills during the walk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_field: Option<PatientField>,
    /// Identifier sent to the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_id: Option<String>,
    #[serde(default)]
    pub source: PatientSource,
    /// The pending field is a one-off fix; the verdict is recomputed after it.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub amending: bool,
    /// Last verdict shown, kept for the summary only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}
