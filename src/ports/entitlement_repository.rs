//! Entitlement repository port.

use async_trait::async_trait;

use crate::domain::entitlement::SubscriberEntitlement;
use crate::domain::foundation::{DomainError, IdentityId, Timestamp};

/// Read access to subscriber entitlements.
///
/// Tier changes go through `PaymentLedger::apply_once` so that they are
/// recorded together with the event that caused them.
#[async_trait]
pub trait EntitlementRepository: Send + Sync {
    /// Finds the entitlement for an identity.
    async fn find(&self, identity: &IdentityId)
        -> Result<Option<SubscriberEntitlement>, DomainError>;

    /// Creates a FREE trial for `identity` unless one already exists, and
    /// returns the stored record either way.
    async fn create_trial(
        &self,
        identity: &IdentityId,
        now: Timestamp,
        trial_days: i64,
    ) -> Result<SubscriberEntitlement, DomainError>;
}
