//! Service catalog and coverage tables.
//!
//! The catalog is an immutable snapshot loaded once at startup and shared by
//! reference. Nothing mutates it while requests are served.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use super::verdict::{format_clp, CoverageClass};
use crate::domain::conversation::text::{contains_phrase, normalize};
use crate::domain::conversation::{ListRow, UserInput};

const EMBEDDED_CATALOG: &str = include_str!("default_catalog.yaml");

/// Prefix of service selection ids in interactive lists.
pub const SERVICE_PREFIX: &str = "svc:";

/// Errors loading or validating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid catalog: {0}")]
    Invalid(String),
}

/// Inclusive age range in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min_days: i64,
    pub max_days: i64,
}

impl AgeRange {
    pub fn contains(&self, age_days: i64) -> bool {
        (self.min_days..=self.max_days).contains(&age_days)
    }
}

/// A bookable service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub code: String,
    pub name: String,
    pub category: String,
    pub private_price: u32,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<AgeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preparation: Option<String>,
    #[serde(default)]
    pub documents: Vec<String>,
}

/// An insurance provider the clinic has agreements with (or knows of).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Row of the coverage table, keyed by (provider, service category).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageEntry {
    pub provider: String,
    pub category: String,
    pub classification: CoverageClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_price: Option<u32>,
    #[serde(default)]
    pub documents: Vec<String>,
}

/// Contractual exception that overrides the coverage table.
///
/// Matches when every field that is set matches: a specific service, a
/// specific provider, a specific weekday, or a combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialRule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<Weekday>,
    pub classification: CoverageClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copay: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_price: Option<u32>,
    pub explanation: String,
    #[serde(default)]
    pub documents: Vec<String>,
}

/// Immutable snapshot of everything the decision engine consults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCatalog {
    /// Short description of the clinic, used for general questions.
    #[serde(default)]
    pub about: String,
    pub services: Vec<Service>,
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub coverage: Vec<CoverageEntry>,
    #[serde(default)]
    pub special_rules: Vec<SpecialRule>,
}

impl ServiceCatalog {
    /// The catalog shipped with the binary.
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_yaml_str(EMBEDDED_CATALOG)
    }

    /// Loads a catalog from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Parses and validates a YAML catalog.
    pub fn from_yaml_str(raw: &str) -> Result<Self, CatalogError> {
        let catalog: ServiceCatalog = serde_yaml::from_str(raw)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Checks codes are unique and every reference points somewhere.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.services.is_empty() {
            return Err(CatalogError::Invalid("no services defined".to_string()));
        }
        let mut codes = HashSet::new();
        for service in &self.services {
            if !codes.insert(service.code.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate service code '{}'",
                    service.code
                )));
            }
            if let Some(range) = service.age_range {
                if range.min_days > range.max_days {
                    return Err(CatalogError::Invalid(format!(
                        "service '{}' has an empty age range",
                        service.code
                    )));
                }
            }
        }
        let providers: HashSet<&str> = self.providers.iter().map(|p| p.code.as_str()).collect();
        let categories: HashSet<&str> = self.services.iter().map(|s| s.category.as_str()).collect();
        for entry in &self.coverage {
            if !providers.contains(entry.provider.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "coverage refers to unknown provider '{}'",
                    entry.provider
                )));
            }
            if !categories.contains(entry.category.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "coverage refers to unknown category '{}'",
                    entry.category
                )));
            }
        }
        for rule in &self.special_rules {
            if rule.service.is_none() && rule.provider.is_none() {
                return Err(CatalogError::Invalid(format!(
                    "special rule '{}' must name a service or a provider",
                    rule.name
                )));
            }
            if rule.service.as_deref().is_some_and(|code| !codes.contains(code)) {
                return Err(CatalogError::Invalid(format!(
                    "special rule '{}' refers to an unknown service",
                    rule.name
                )));
            }
            if rule.provider.as_deref().is_some_and(|code| !providers.contains(code)) {
                return Err(CatalogError::Invalid(format!(
                    "special rule '{}' refers to an unknown provider",
                    rule.name
                )));
            }
        }
        Ok(())
    }

    pub fn service_by_code(&self, code: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.code == code)
    }

    /// Resolves a service from its code, its name or an alias.
    pub fn resolve_service(&self, raw: &str) -> Option<&Service> {
        let wanted = normalize(raw);
        if wanted.is_empty() {
            return None;
        }
        self.services.iter().find(|s| {
            s.code == raw.trim()
                || normalize(&s.name) == wanted
                || s.aliases.iter().any(|a| normalize(a) == wanted)
        })
    }

    /// Finds a service mentioned anywhere in free text.
    pub fn find_service_in(&self, text: &str) -> Option<&Service> {
        if let Some(service) = self.resolve_service(text) {
            return Some(service);
        }
        let text = normalize(text);
        self.services.iter().find(|s| {
            contains_phrase(&text, &normalize(&s.name))
                || s.aliases.iter().any(|a| contains_phrase(&text, &normalize(a)))
        })
    }

    /// Resolves an insurance provider from its code, its name or an alias.
    pub fn resolve_provider(&self, raw: &str) -> Option<&Provider> {
        let wanted = normalize(raw);
        if wanted.is_empty() {
            return None;
        }
        self.providers.iter().find(|p| {
            normalize(&p.code) == wanted
                || normalize(&p.name) == wanted
                || p.aliases.iter().any(|a| normalize(a) == wanted)
        })
    }

    pub fn coverage_for(&self, provider: &str, category: &str) -> Option<&CoverageEntry> {
        self.coverage
            .iter()
            .find(|e| e.provider == provider && e.category == category)
    }

    /// Service named by a list selection (`svc:{code}`) or mentioned in text.
    pub fn service_from_input(&self, input: &UserInput) -> Option<&Service> {
        match input.raw.strip_prefix(SERVICE_PREFIX) {
            Some(code) => self.service_by_code(code),
            None if input.is_selection() => None,
            None => self.find_service_in(&input.raw),
        }
    }

    /// One selectable row per service.
    pub fn service_rows(&self) -> Vec<ListRow> {
        self.services
            .iter()
            .map(|s| {
                ListRow::new(format!("{}{}", SERVICE_PREFIX, s.code), &s.name)
                    .with_description(&format!("Particular {}", format_clp(s.private_price)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn embedded_catalog_is_valid() {
        let catalog = ServiceCatalog::embedded().unwrap();
        assert!(catalog.service_by_code("consulta-pediatrica").is_some());
        assert!(!catalog.about.is_empty());
    }

    #[test]
    fn resolves_services_by_name_alias_and_text() {
        let catalog = ServiceCatalog::embedded().unwrap();
        assert_eq!(
            catalog.resolve_service("consulta pediatrica").map(|s| s.code.as_str()),
            Some("consulta-pediatrica")
        );
        assert_eq!(
            catalog.resolve_service("Consulta Pediátrica").map(|s| s.code.as_str()),
            Some("consulta-pediatrica")
        );
        assert_eq!(
            catalog
                .find_service_in("quiero saber si me cubren la kinesiología")
                .map(|s| s.code.as_str()),
            Some("kinesiologia")
        );
        assert!(catalog.resolve_service("cirugía cardiaca").is_none());
    }

    #[test]
    fn service_from_selection_or_text() {
        let catalog = ServiceCatalog::embedded().unwrap();
        let picked = catalog.service_from_input(&UserInput::selection("svc:fonoaudiologia"));
        assert_eq!(picked.map(|s| s.code.as_str()), Some("fonoaudiologia"));
        assert!(catalog
            .service_from_input(&UserInput::selection("svc:cirugia"))
            .is_none());
        let typed = catalog.service_from_input(&UserInput::text("necesito fono para mi hijo"));
        assert_eq!(typed.map(|s| s.code.as_str()), Some("fonoaudiologia"));
        assert_eq!(catalog.service_rows().len(), catalog.services.len());
    }

    #[test]
    fn resolves_providers_by_alias() {
        let catalog = ServiceCatalog::embedded().unwrap();
        assert_eq!(catalog.resolve_provider("fonasa").map(|p| p.code.as_str()), Some("FONASA"));
        assert_eq!(catalog.resolve_provider("Isapre A").map(|p| p.code.as_str()), Some("A"));
        assert!(catalog.resolve_provider("Isapre Desconocida").is_none());
    }

    #[test]
    fn rejects_coverage_for_unknown_provider() {
        let raw = r#"
services:
  - code: consulta
    name: Consulta
    category: consultations
    private_price: 30000
providers:
  - code: A
    name: Isapre A
coverage:
  - provider: Z
    category: consultations
    classification: covered
"#;
        assert!(matches!(
            ServiceCatalog::from_yaml_str(raw),
            Err(CatalogError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_special_rule_without_target() {
        let raw = r#"
services:
  - code: consulta
    name: Consulta
    category: consultations
    private_price: 30000
providers: []
special_rules:
  - name: everything-free
    classification: covered
    explanation: Gratis
"#;
        assert!(ServiceCatalog::from_yaml_str(raw).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "services:\n  - code: eco\n    name: Ecografía\n    category: imaging\n    private_price: 40000\nproviders: []\n"
        )
        .unwrap();
        let catalog = ServiceCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.services[0].name, "Ecografía");
        assert!(catalog.coverage.is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            ServiceCatalog::load("/definitely/not/here.yaml"),
            Err(CatalogError::Io(_))
        ));
    }
}
