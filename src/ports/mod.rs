//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `CounterStore` - Durable fixed-window counters
//! - `RateLimiter` - Per-caller request budgets
//! - `EntitlementRepository` - Subscriber plan lookup
//! - `PaymentLedger` - Idempotent payment event application

mod counter_store;
mod entitlement_repository;
mod payment_ledger;
mod rate_limiter;

pub use counter_store::{CounterKey, CounterStore, CounterStoreError};
pub use entitlement_repository::EntitlementRepository;
pub use payment_ledger::{LedgerOutcome, PaymentLedger};
pub use rate_limiter::{RateLimitDecision, RateLimitKey, RateLimitPath, RateLimiter};
