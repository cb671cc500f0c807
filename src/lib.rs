//! Access Meter - rate limiting, plan entitlements, and usage quotas
//!
//! Decides for each inbound request whether the caller is within its rate
//! budget, whether its subscription tier unlocks the requested feature, and
//! whether that feature has allowance left this period. Payment webhooks
//! mutate entitlements exactly once per provider event.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
