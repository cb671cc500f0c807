//! Billing - payment provider events and webhook verification.

mod payment_event;
mod webhook_errors;
mod webhook_verifier;

pub use payment_event::{EntitlementChange, PaymentEvent, PaymentEventData, PaymentEventType};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{sign_payload, WebhookVerifier};
