//! Verdict produced by the decision engine.

use serde::{Deserialize, Serialize};

/// Coverage classification, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageClass {
    Covered,
    WaitListed,
    PrivatePayOnly,
    NotCovered,
    SpecialRate,
    Error,
}

/// What the conversation should do next with this verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    ShowAppointments,
    JoinWaitlist,
    OfferPrivatePay,
    ContactHuman,
    ReviewPatientData,
}

impl NextAction {
    /// Actions that continue into scheduling.
    pub fn leads_to_scheduling(&self) -> bool {
        matches!(
            self,
            NextAction::ShowAppointments | NextAction::JoinWaitlist | NextAction::OfferPrivatePay
        )
    }
}

/// Amounts in CLP. Empty when the patient is not eligible at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct PaymentInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copay: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bond: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_price: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_price: Option<u32>,
}

impl PaymentInfo {
    pub fn is_empty(&self) -> bool {
        self.copay.is_none()
            && self.bond.is_none()
            && self.private_price.is_none()
            && self.special_price.is_none()
    }

    /// What the patient pays at the clinic, if anything is known.
    pub fn amount_due(&self) -> Option<u32> {
        self.special_price
            .or(self.copay)
            .or(self.private_price)
    }

    /// One line per known amount.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(copay) = self.copay {
            lines.push(format!("Copago: {}", format_clp(copay)));
        }
        if let Some(bond) = self.bond {
            lines.push(format!("Bono: {}", format_clp(bond)));
        }
        if let Some(price) = self.special_price {
            lines.push(format!("Valor convenio: {}", format_clp(price)));
        }
        if let Some(price) = self.private_price {
            lines.push(format!("Valor particular: {}", format_clp(price)));
        }
        lines
    }
}

/// Deterministic outcome of a coverage decision. Never persisted as the
/// source of truth; recomputed from the patient record and the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub classification: CoverageClass,
    pub required_documents: Vec<String>,
    pub payment_info: PaymentInfo,
    pub next_action: NextAction,
    pub explanation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preparation: Option<String>,
}

impl Verdict {
    /// Full message for the patient: explanation, amounts, documents and
    /// preparation.
    pub fn render(&self) -> String {
        let mut text = self.explanation.clone();
        let amounts = self.payment_info.describe();
        if !amounts.is_empty() {
            text.push_str("\n\n");
            text.push_str(&amounts.join("\n"));
        }
        if !self.required_documents.is_empty() {
            text.push_str("\n\nDocumentos que debes traer:");
            for doc in &self.required_documents {
                text.push_str(&format!("\n- {}", doc));
            }
        }
        if let Some(preparation) = &self.preparation {
            text.push_str(&format!("\n\nPreparación: {}", preparation));
        }
        text
    }
}

/// Formats pesos with dot thousands separators: `$4.000`.
pub fn format_clp(amount: u32) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    format!("${}", out)
}
