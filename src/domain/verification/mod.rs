//! Coverage verification workflow: patient data and the verdict handoff.

pub mod machine;
mod patient;
mod state;

pub use machine::{Handoff, VerificationEffect, VerificationEnv, VerificationEvent, VerificationTransition};
pub use patient::{parse_birth_date, parse_patient_id, FieldValue, PatientField, PatientRecord};
pub use state::{PatientSource, VerificationPayload, VerificationState};
