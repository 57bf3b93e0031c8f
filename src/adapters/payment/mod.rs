//! Payment link adapters.
//!
//! - **StripePaymentLinks** - Stripe Checkout sessions in payment mode
//! - **MockPaymentProvider** - In-memory links with call tracking, for tests
//!   and local runs without a Stripe key

mod mock_payment_provider;
mod stripe_links;

pub use mock_payment_provider::MockPaymentProvider;
pub use stripe_links::{StripeConfig, StripePaymentLinks};
