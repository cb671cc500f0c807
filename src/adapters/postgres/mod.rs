//! PostgreSQL adapters - Database implementations for the metering ports.
//!
//! - `PostgresCounterStore` - Row-locked fixed-window counters
//! - `PostgresEntitlementRepository` - Subscriber entitlement lookup
//! - `PostgresPaymentLedger` - Transactional webhook idempotency ledger

mod counter_store;
mod entitlement_repository;
mod payment_ledger;

pub use counter_store::PostgresCounterStore;
pub use entitlement_repository::PostgresEntitlementRepository;
pub use payment_ledger::PostgresPaymentLedger;
