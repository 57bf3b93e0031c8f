//! Payment configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Payment link configuration (Stripe Checkout)
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Stripe secret key; without one links come from the mock provider
    pub stripe_api_key: Option<String>,

    /// ISO currency of catalog prices
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Where Stripe sends the patient after paying
    #[serde(default = "default_success_url")]
    pub success_url: String,

    /// Where Stripe sends the patient after backing out
    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,
}

impl PaymentConfig {
    /// Check if a Stripe key is configured
    pub fn is_configured(&self) -> bool {
        self.stripe_api_key.as_ref().is_some_and(|k| !k.is_empty())
    }

    /// Check if using Stripe test mode
    pub fn is_test_mode(&self) -> bool {
        self.stripe_api_key
            .as_ref()
            .is_some_and(|k| k.starts_with("sk_test_"))
    }

    /// Validate payment configuration
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        match self.stripe_api_key.as_deref() {
            Some(key) if !key.is_empty() => {
                // Verify key prefixes for safety
                if !key.starts_with("sk_") && !key.starts_with("rk_") {
                    return Err(ValidationError::InvalidStripeKey);
                }
            }
            _ if production => {
                return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_API_KEY"));
            }
            _ => {}
        }
        if self.currency.len() != 3 {
            return Err(ValidationError::OutOfRange("PAYMENT__CURRENCY"));
        }
        for (name, url) in [
            ("PAYMENT__SUCCESS_URL", &self.success_url),
            ("PAYMENT__CANCEL_URL", &self.cancel_url),
        ] {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(ValidationError::InvalidUrl(name));
            }
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            stripe_api_key: None,
            currency: default_currency(),
            success_url: default_success_url(),
            cancel_url: default_cancel_url(),
        }
    }
}

fn default_currency() -> String {
    "clp".to_string()
}

fn default_success_url() -> String {
    "https://example.com/pago/listo".to_string()
}

fn default_cancel_url() -> String {
    "https://example.com/pago/cancelado".to_string()
}
