//! Payment workflow: payment link, proof and receipt.

pub mod machine;
mod state;

pub use machine::{PaymentEffect, PaymentEnv, PaymentEvent, PaymentTransition};
pub use state::{PaymentPayload, PaymentReceipt, PaymentState, Quote};
