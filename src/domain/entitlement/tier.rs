//! Subscription tier definitions.
//!
//! Represents the plan levels a subscriber can hold.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Subscription tier.
///
/// Exactly one tier is active for a subscriber at a time. Capability sets
/// are strictly additive in `rank` order, see `CapabilityTable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    /// Trial ended without a paid tier ever being granted. No capabilities.
    ExpiredFree,

    /// Free trial tier, valid until `trial_ends_at`.
    Free,

    /// Entry paid tier.
    Basic,

    /// Mid paid tier.
    Plus,

    /// Top paid tier.
    Pro,
}

impl SubscriptionTier {
    /// All tiers, lowest first.
    pub const ALL: [SubscriptionTier; 5] = [
        SubscriptionTier::ExpiredFree,
        SubscriptionTier::Free,
        SubscriptionTier::Basic,
        SubscriptionTier::Plus,
        SubscriptionTier::Pro,
    ];

    /// Returns true if this tier is a paid tier.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            SubscriptionTier::Basic | SubscriptionTier::Plus | SubscriptionTier::Pro
        )
    }

    /// Returns the display name for this tier.
    pub fn display_name(&self) -> &'static str {
        match self {
            SubscriptionTier::ExpiredFree => "Expired trial",
            SubscriptionTier::Free => "Free trial",
            SubscriptionTier::Basic => "Basic",
            SubscriptionTier::Plus => "Plus",
            SubscriptionTier::Pro => "Pro",
        }
    }

    /// Returns the storage representation of this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::ExpiredFree => "expired_free",
            SubscriptionTier::Free => "free",
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Plus => "plus",
            SubscriptionTier::Pro => "pro",
        }
    }

    /// Returns the numeric rank of this tier for comparison.
    ///
    /// Higher rank = more features. `Free` and `Basic` share a rank band
    /// below `Plus`; Basic is ranked above Free so upgrades compare cleanly.
    pub fn rank(&self) -> u8 {
        match self {
            SubscriptionTier::ExpiredFree => 0,
            SubscriptionTier::Free => 1,
            SubscriptionTier::Basic => 2,
            SubscriptionTier::Plus => 3,
            SubscriptionTier::Pro => 4,
        }
    }
}

impl std::fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for SubscriptionTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expired_free" | "expired-free" => Ok(SubscriptionTier::ExpiredFree),
            "free" => Ok(SubscriptionTier::Free),
            "basic" => Ok(SubscriptionTier::Basic),
            "plus" => Ok(SubscriptionTier::Plus),
            "pro" => Ok(SubscriptionTier::Pro),
            other => Err(ValidationError::invalid_format(
                "tier",
                format!("unknown tier '{}'", other),
            )),
        }
    }
}
