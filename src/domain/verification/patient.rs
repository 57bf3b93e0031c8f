//! Patient record and per-field validation.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// Oldest birth date accepted, in years before today.
const MAX_AGE_YEARS: i32 = 120;

/// Patient data as collected or fetched during verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PatientRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub insurance_provider: String,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub member_number: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

impl PatientRecord {
    /// Age in whole days on `on`, `None` without a birth date.
    pub fn age_in_days(&self, on: NaiveDate) -> Option<i64> {
        self.birth_date.map(|birth| (on - birth).num_days())
    }

    /// Multi-line summary shown when asking the patient to confirm.
    pub fn summary(&self) -> String {
        let birth = self
            .birth_date
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_else(|| "sin registrar".to_string());
        format!(
            "Nombre: {}\nFecha de nacimiento: {}\nPrevisión: {}\nPlan: {}\nN° de afiliado: {}\nTeléfono: {}\nCorreo: {}",
            or_dash(&self.name),
            birth,
            or_dash(&self.insurance_provider),
            or_dash(&self.plan),
            or_dash(&self.member_number),
            or_dash(&self.phone),
            or_dash(&self.email),
        )
    }

    /// Stores a validated value for `field`.
    pub fn set(&mut self, field: PatientField, value: FieldValue) {
        match (field, value) {
            (PatientField::BirthDate, FieldValue::Date(date)) => self.birth_date = Some(date),
            (PatientField::InsuranceProvider, FieldValue::Text(v)) => self.insurance_provider = v,
            (PatientField::Plan, FieldValue::Text(v)) => self.plan = v,
            (PatientField::Name, FieldValue::Text(v)) => self.name = v,
            (PatientField::Phone, FieldValue::Text(v)) => self.phone = v,
            (PatientField::Email, FieldValue::Text(v)) => self.email = v,
            (PatientField::MemberNumber, FieldValue::Text(v)) => self.member_number = v,
            // validate() only produces dates for BirthDate
            (_, FieldValue::Date(_)) | (PatientField::BirthDate, FieldValue::Text(_)) => {}
        }
    }
}

fn or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

/// Fields collected from a new patient, in asking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientField {
    InsuranceProvider,
    Plan,
    Name,
    BirthDate,
    Phone,
    Email,
    MemberNumber,
}

/// A validated field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
}

impl PatientField {
    pub const ORDER: [PatientField; 7] = [
        PatientField::InsuranceProvider,
        PatientField::Plan,
        PatientField::Name,
        PatientField::BirthDate,
        PatientField::Phone,
        PatientField::Email,
        PatientField::MemberNumber,
    ];

    pub fn first() -> Self {
        Self::ORDER[0]
    }

    /// The field asked after this one, `None` after the last.
    pub fn next(&self) -> Option<Self> {
        let index = Self::ORDER.iter().position(|f| f == self)?;
        Self::ORDER.get(index + 1).copied()
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            PatientField::InsuranceProvider => "¿Cuál es tu previsión de salud? (por ejemplo FONASA o el nombre de tu isapre)",
            PatientField::Plan => "¿Cuál es tu plan?",
            PatientField::Name => "¿Cuál es el nombre completo del paciente?",
            PatientField::BirthDate => "¿Cuál es la fecha de nacimiento del paciente? (dd/mm/aaaa)",
            PatientField::Phone => "¿A qué teléfono te podemos contactar?",
            PatientField::Email => "¿Cuál es tu correo electrónico?",
            PatientField::MemberNumber => "Por último, ¿cuál es tu número de afiliado?",
        }
    }

    /// Validates a raw answer for this field.
    pub fn validate(&self, raw: &str, today: NaiveDate) -> Result<FieldValue, ValidationError> {
        let value = raw.trim();
        match self {
            PatientField::BirthDate => parse_birth_date(value, today).map(FieldValue::Date),
            PatientField::Email => validate_email(value).map(FieldValue::Text),
            PatientField::Phone => validate_phone(value).map(FieldValue::Text),
            PatientField::Name => {
                if value.chars().filter(|c| c.is_alphabetic()).count() < 2 {
                    Err(ValidationError::invalid_format("name", "too short"))
                } else {
                    Ok(FieldValue::Text(value.to_string()))
                }
            }
            PatientField::InsuranceProvider | PatientField::Plan | PatientField::MemberNumber => {
                if value.is_empty() {
                    Err(ValidationError::empty_field(self.key()))
                } else {
                    Ok(FieldValue::Text(value.to_string()))
                }
            }
        }
    }

    fn key(&self) -> &'static str {
        match self {
            PatientField::InsuranceProvider => "insurance_provider",
            PatientField::Plan => "plan",
            PatientField::Name => "name",
            PatientField::BirthDate => "birth_date",
            PatientField::Phone => "phone",
            PatientField::Email => "email",
            PatientField::MemberNumber => "member_number",
        }
    }
}

/// Accepts `dd/mm/yyyy`, `dd-mm-yyyy` and `yyyy-mm-dd`.
pub fn parse_birth_date(raw: &str, today: NaiveDate) -> Result<NaiveDate, ValidationError> {
    let date = ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d", "%d.%m.%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .ok_or_else(|| ValidationError::invalid_format("birth_date", "expected dd/mm/yyyy"))?;
    if date > today {
        return Err(ValidationError::invalid_format("birth_date", "date is in the future"));
    }
    if today.year() - date.year() > MAX_AGE_YEARS {
        return Err(ValidationError::out_of_range(
            "birth_date",
            (today.year() - MAX_AGE_YEARS) as i64,
            today.year() as i64,
            date.year() as i64,
        ));
    }
    Ok(date)
}

fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::invalid_format("email", "missing @"));
    };
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@');
    if local.is_empty() || !domain_ok || email.contains(char::is_whitespace) {
        return Err(ValidationError::invalid_format("email", "not an address"));
    }
    Ok(email)
}

fn validate_phone(raw: &str) -> Result<String, ValidationError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '+'))
        .collect();
    if !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::invalid_format("phone", "digits only"));
    }
    let digits = cleaned.len() as i64;
    if !(8..=15).contains(&digits) {
        return Err(ValidationError::out_of_range("phone", 8, 15, digits));
    }
    Ok(cleaned)
}

/// Normalizes a registry identifier (RUT body or patient number).
///
/// Dots, dashes and spaces are ignored; 4 to 12 digits remain. Anything
/// else is a malformed identifier and must never reach the registry.
pub fn parse_patient_id(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | ' '))
        .collect();
    let valid = (4..=12).contains(&cleaned.len()) && cleaned.chars().all(|c| c.is_ascii_digit());
    valid.then_some(cleaned)
}
