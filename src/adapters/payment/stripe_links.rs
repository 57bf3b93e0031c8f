//! Stripe Checkout adapter.
//!
//! Creates a one-off Checkout Session in `payment` mode and hands back its
//! hosted URL. The session id is the reference used to reconcile proofs.
//!
//! ```ignore
//! let config = StripeConfig::new(api_key, "clp", success_url, cancel_url);
//! let links = StripePaymentLinks::new(config);
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::ports::{ExternalError, PaymentLink, PaymentLinkRequest, PaymentProvider};

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,
    currency: String,
    success_url: String,
    cancel_url: String,
    /// Base URL for the Stripe API (default: https://api.stripe.com).
    api_base_url: String,
}

impl StripeConfig {
    pub fn new(
        api_key: impl Into<String>,
        currency: impl Into<String>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            currency: currency.into(),
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
            api_base_url: "https://api.stripe.com".to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_key", &"[REDACTED]")
            .field("currency", &self.currency)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

/// Checkout Session fields we read back.
#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Stripe payment link adapter.
pub struct StripePaymentLinks {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentLinks {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn form(&self, request: &PaymentLinkRequest) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "payment".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", self.config.currency.clone()),
            ("line_items[0][price_data][unit_amount]", request.amount.to_string()),
            (
                "line_items[0][price_data][product_data][name]",
                request.description.clone(),
            ),
            ("success_url", self.config.success_url.clone()),
            ("cancel_url", self.config.cancel_url.clone()),
            ("metadata[user_id]", request.user_id.to_string()),
            ("metadata[service]", request.service_code.clone()),
        ]
    }
}

/// Maps a non-success Stripe response onto the port error.
fn map_status(status: u16, body: &str) -> ExternalError {
    let message = serde_json::from_str::<StripeErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| body.to_string());
    match status {
        401 | 403 => ExternalError::Unauthorized,
        404 => ExternalError::NotFound(message),
        409 => ExternalError::Conflict(message),
        429 => ExternalError::RateLimited { retry_after_secs: 1 },
        400..=499 => ExternalError::InvalidRequest(message),
        _ => ExternalError::server(status, message),
    }
}

#[async_trait]
impl PaymentProvider for StripePaymentLinks {
    async fn create_payment_link(
        &self,
        request: PaymentLinkRequest,
    ) -> Result<PaymentLink, ExternalError> {
        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);

        let response = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(&self.form(&request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExternalError::Timeout {
                        operation: "stripe.checkout".to_string(),
                        timeout_ms: 0,
                    }
                } else {
                    ExternalError::network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "stripe checkout session failed");
            return Err(map_status(status.as_u16(), &body));
        }

        let session: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| ExternalError::server(502, format!("unreadable Stripe response: {}", e)))?;

        let url = session
            .url
            .unwrap_or_else(|| format!("https://checkout.stripe.com/c/pay/{}", session.id));

        Ok(PaymentLink {
            url,
            reference: session.id,
        })
    }
}
