//! Subscriber entitlement record.

use serde::{Deserialize, Serialize};

use super::SubscriptionTier;
use crate::domain::foundation::{IdentityId, Timestamp};

/// Default trial length for newly provisioned identities.
pub const DEFAULT_TRIAL_DAYS: i64 = 7;

/// The plan state of one identity.
///
/// The stored `tier` is never rewritten when a trial lapses; use
/// [`SubscriberEntitlement::effective_tier`] to read the tier in force.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberEntitlement {
    pub identity_id: IdentityId,
    pub tier: SubscriptionTier,
    pub trial_ends_at: Option<Timestamp>,
    pub privileged_override: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SubscriberEntitlement {
    /// Creates a FREE trial that ends `trial_days` after `now`.
    pub fn new_trial(identity_id: IdentityId, now: Timestamp, trial_days: i64) -> Self {
        Self {
            identity_id,
            tier: SubscriptionTier::Free,
            trial_ends_at: Some(now.add_days(trial_days)),
            privileged_override: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks this entitlement as an operator override.
    pub fn with_privileged_override(mut self) -> Self {
        self.privileged_override = true;
        self
    }

    /// Returns true once a FREE trial's end has passed.
    ///
    /// A FREE record without a trial end never expires.
    pub fn trial_expired(&self, now: &Timestamp) -> bool {
        self.tier == SubscriptionTier::Free
            && self
                .trial_ends_at
                .map(|ends| now.is_after(&ends))
                .unwrap_or(false)
    }

    /// Tier in force at `now`, with lapsed trials read as `ExpiredFree`.
    pub fn effective_tier(&self, now: &Timestamp) -> SubscriptionTier {
        if self.trial_expired(now) {
            SubscriptionTier::ExpiredFree
        } else {
            self.tier
        }
    }
}
