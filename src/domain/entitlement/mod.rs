//! Entitlement - subscription tiers and the features they unlock.

mod capabilities;
mod feature;
mod resolver;
mod subscriber;
mod tier;

pub use capabilities::{CapabilityTable, CapabilityTableError};
pub use feature::Feature;
pub use resolver::{
    anonymous_tier, has_access, require_access, resolve_capabilities, EntitlementResolver,
};
pub use subscriber::{SubscriberEntitlement, DEFAULT_TRIAL_DAYS};
pub use tier::SubscriptionTier;
