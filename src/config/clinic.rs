//! Clinic identity and service catalog location

use serde::Deserialize;
use std::path::PathBuf;

use super::error::ValidationError;

/// Who the assistant speaks for
#[derive(Debug, Clone, Deserialize)]
pub struct ClinicConfig {
    #[serde(default = "default_name")]
    pub name: String,

    /// Phone or address patients are sent to when the engine cannot help
    #[serde(default = "default_human_contact")]
    pub human_contact: String,
}

impl ClinicConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingRequired("CLINIC__NAME"));
        }
        if self.human_contact.trim().is_empty() {
            return Err(ValidationError::MissingRequired("CLINIC__HUMAN_CONTACT"));
        }
        Ok(())
    }
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            human_contact: default_human_contact(),
        }
    }
}

fn default_name() -> String {
    "la clínica".to_string()
}

fn default_human_contact() -> String {
    "recepción".to_string()
}

/// Service catalog and patient seed sources
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// YAML catalog; the embedded one is used when unset
    pub path: Option<PathBuf>,

    /// JSON array of known patients for the in-memory registry
    pub patients_path: Option<PathBuf>,
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.path {
            Some(path) if path.as_os_str().is_empty() => {
                return Err(ValidationError::MissingRequired("CATALOG__PATH"))
            }
            _ => {}
        }
        match &self.patients_path {
            Some(path) if path.as_os_str().is_empty() => {
                Err(ValidationError::MissingRequired("CATALOG__PATIENTS_PATH"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clinic_defaults_validate() {
        assert!(ClinicConfig::default().validate().is_ok());
        assert!(CatalogConfig::default().validate().is_ok());
    }

    #[test]
    fn test_blank_contact_rejected() {
        let config = ClinicConfig {
            human_contact: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingRequired("CLINIC__HUMAN_CONTACT"))
        );
    }
}
