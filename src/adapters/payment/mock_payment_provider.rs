//! Mock payment provider.
//!
//! Issues fake Checkout URLs and records every request. `failing()` returns
//! a retryable error on every call.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::ports::{ExternalError, PaymentLink, PaymentLinkRequest, PaymentProvider};

#[derive(Debug, Default)]
struct MockState {
    requests: Vec<PaymentLinkRequest>,
}

/// Mock payment provider for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct MockPaymentProvider {
    inner: Arc<Mutex<MockState>>,
    failing: bool,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider whose every call fails with a 503.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Number of links issued so far.
    pub fn links_created(&self) -> usize {
        self.state().requests.len()
    }

    pub fn last_request(&self) -> Option<PaymentLinkRequest> {
        self.state().requests.last().cloned()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_payment_link(
        &self,
        request: PaymentLinkRequest,
    ) -> Result<PaymentLink, ExternalError> {
        if self.failing {
            return Err(ExternalError::server(503, "mock payment provider unavailable"));
        }
        let id = format!("cs_mock_{}", uuid::Uuid::new_v4().simple());
        self.state().requests.push(request);
        Ok(PaymentLink {
            url: format!("https://checkout.stripe.com/c/pay/{}", id),
            reference: id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::UserId;

    fn request(amount: u32) -> PaymentLinkRequest {
        PaymentLinkRequest {
            user_id: UserId::new("+56911112222").unwrap(),
            service_code: "CONSULTA".to_string(),
            description: "Consulta general".to_string(),
            amount,
        }
    }

    #[tokio::test]
    async fn tracks_requests_and_issues_unique_references() {
        let mock = MockPaymentProvider::new();
        let first = mock.create_payment_link(request(1000)).await.unwrap();
        let second = mock.create_payment_link(request(2000)).await.unwrap();
        assert_ne!(first.reference, second.reference);
        assert!(first.url.starts_with("https://"));
        assert_eq!(mock.links_created(), 2);
        assert_eq!(mock.last_request().map(|r| r.amount), Some(2000));
    }

    #[tokio::test]
    async fn failing_mock_is_retryable_and_records_nothing() {
        let mock = MockPaymentProvider::failing();
        let err = mock.create_payment_link(request(1000)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(mock.links_created(), 0);
    }
}
