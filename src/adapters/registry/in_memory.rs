//! In-memory patient registry, optionally seeded from a JSON file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::verification::{parse_patient_id, PatientRecord};
use crate::ports::{ExternalError, PatientRegistry};

/// Registry keyed by normalized patient id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPatientRegistry {
    patients: Arc<RwLock<HashMap<String, PatientRecord>>>,
}

impl InMemoryPatientRegistry {
    /// Records without a parseable id are skipped.
    pub fn new(records: Vec<PatientRecord>) -> Self {
        let patients = records
            .into_iter()
            .filter_map(|record| {
                let id = record.id.as_deref().and_then(parse_patient_id)?;
                Some((id, record))
            })
            .collect();
        Self {
            patients: Arc::new(RwLock::new(patients)),
        }
    }

    /// Loads a JSON array of patient records.
    pub fn from_json_file(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let records: Vec<PatientRecord> = serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self::new(records))
    }

    pub async fn insert(&self, record: PatientRecord) {
        if let Some(id) = record.id.as_deref().and_then(parse_patient_id) {
            self.patients.write().await.insert(id, record);
        }
    }

    pub async fn len(&self) -> usize {
        self.patients.read().await.len()
    }
}

#[async_trait]
impl PatientRegistry for InMemoryPatientRegistry {
    async fn find_by_id(&self, id: &str) -> Result<Option<PatientRecord>, ExternalError> {
        let Some(key) = parse_patient_id(id) else {
            return Err(ExternalError::InvalidRequest(format!("malformed patient id {:?}", id)));
        };
        Ok(self.patients.read().await.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(id: &str, name: &str) -> PatientRecord {
        PatientRecord {
            id: Some(id.to_string()),
            name: name.to_string(),
            ..PatientRecord::default()
        }
    }

    #[tokio::test]
    async fn lookup_ignores_formatting() {
        let registry = InMemoryPatientRegistry::new(vec![record("12.345.678", "Ana Pérez")]);
        let found = registry.find_by_id("12345678").await.unwrap();
        assert_eq!(found.map(|r| r.name), Some("Ana Pérez".to_string()));
        assert!(registry.find_by_id("99999999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_id_is_rejected() {
        let registry = InMemoryPatientRegistry::new(Vec::new());
        assert!(matches!(
            registry.find_by_id("abc").await,
            Err(ExternalError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn seeds_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id":"7654321","name":"Luis Soto"}},{{"name":"sin id"}}]"#).unwrap();
        let registry = InMemoryPatientRegistry::from_json_file(file.path()).unwrap();
        assert_eq!(registry.len().await, 1);
        assert!(registry.find_by_id("7.654.321").await.unwrap().is_some());
    }
}
