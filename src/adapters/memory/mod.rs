//! In-memory adapters.
//!
//! `FallbackCache` is the production degraded path for the rate limiter.
//! The other types back tests and local development.

mod counter_store;
mod entitlement_repository;
mod fallback_cache;
mod payment_ledger;

pub use counter_store::InMemoryCounterStore;
pub use entitlement_repository::InMemoryEntitlementRepository;
pub use fallback_cache::FallbackCache;
pub use payment_ledger::InMemoryPaymentLedger;
