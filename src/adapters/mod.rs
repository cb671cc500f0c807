//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `memory` - In-process stores and the fallback cache
//! - `postgres` - Durable counters, entitlements, payment ledger
//! - `redis` - Alternative durable counter store
//! - `http` - Axum routes and middleware

pub mod http;
pub mod memory;
pub mod postgres;
pub mod redis;

pub use memory::{FallbackCache, InMemoryCounterStore, InMemoryEntitlementRepository, InMemoryPaymentLedger};
pub use postgres::{PostgresCounterStore, PostgresEntitlementRepository, PostgresPaymentLedger};
pub use redis::RedisCounterStore;
