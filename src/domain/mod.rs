//! Domain layer containing the access rules and their types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (identifiers, timestamps, clock, errors)
//! - `entitlement` - Subscription tiers, features, and capability resolution
//! - `metering` - Fixed-window counters, quota policies, access denials
//! - `billing` - Payment provider events and webhook signature checks

pub mod billing;
pub mod entitlement;
pub mod foundation;
pub mod metering;
