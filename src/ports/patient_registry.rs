//! Patient Registry Port - lookup of existing patients.

use async_trait::async_trait;

use super::ExternalError;
use crate::domain::verification::PatientRecord;

#[async_trait]
pub trait PatientRegistry: Send + Sync {
    /// Finds a patient by normalized identifier. `Ok(None)` when unknown.
    async fn find_by_id(&self, id: &str) -> Result<Option<PatientRecord>, ExternalError>;
}
