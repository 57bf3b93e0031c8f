//! Payment provider port for payment links.
//!
//! The engine never handles card data: it asks the provider for a hosted
//! payment page and sends the link to the patient.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ExternalError;
use crate::domain::foundation::UserId;

/// Port for payment link generation.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment_link(
        &self,
        request: PaymentLinkRequest,
    ) -> Result<PaymentLink, ExternalError>;
}

/// Request for a one-off payment page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLinkRequest {
    pub user_id: UserId,
    /// Catalog code, stored as metadata.
    pub service_code: String,
    /// Line item shown on the payment page.
    pub description: String,
    /// CLP, a zero-decimal currency.
    pub amount: u32,
}

/// A payment page ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub url: String,
    /// Provider reference used to reconcile the proof.
    pub reference: String,
}
