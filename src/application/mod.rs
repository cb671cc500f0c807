//! Application layer - services and command handlers.
//!
//! This layer composes domain rules with ports:
//!
//! - `RateLimitService` - request budgets with an in-process fallback
//! - `UsageQuotaTracker` - per-feature allowances
//! - `AccessGate` - rate limit, entitlement, and quota in one call
//! - `HandlePaymentWebhookHandler` - idempotent entitlement changes
//! - `Sweeper` - background cleanup of expired windows

mod access_gate;
mod payment_webhook;
mod rate_limit;
mod sweeper;
mod usage_quota;

pub use access_gate::{AccessGate, GateDecision};
pub use payment_webhook::{HandlePaymentWebhookCommand, HandlePaymentWebhookHandler, WebhookOutcome};
pub use rate_limit::{RateLimitPolicy, RateLimitService, WindowLimit};
pub use sweeper::{spawn_sweeper, SweepReport, Sweeper};
pub use usage_quota::UsageQuotaTracker;
