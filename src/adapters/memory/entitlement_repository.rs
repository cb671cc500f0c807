//! In-memory entitlement repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::entitlement::{SubscriberEntitlement, SubscriptionTier};
use crate::domain::foundation::{DomainError, IdentityId, Timestamp};
use crate::ports::EntitlementRepository;

/// In-memory entitlement storage for tests and development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntitlementRepository {
    entitlements: Arc<RwLock<HashMap<IdentityId, SubscriberEntitlement>>>,
    unavailable: Arc<AtomicBool>,
    latency: Arc<Mutex<Option<Duration>>>,
}

impl InMemoryEntitlementRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a record.
    pub async fn insert(&self, entitlement: SubscriberEntitlement) {
        self.entitlements
            .write()
            .await
            .insert(entitlement.identity_id.clone(), entitlement);
    }

    /// Makes every call fail until switched back.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner()) = latency;
    }

    /// Sets the stored tier, creating a record without a trial if needed.
    pub(crate) async fn upsert_tier(
        &self,
        identity: &IdentityId,
        tier: SubscriptionTier,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        self.simulate().await?;
        let mut entitlements = self.entitlements.write().await;
        let entry = entitlements
            .entry(identity.clone())
            .or_insert_with(|| SubscriberEntitlement {
                identity_id: identity.clone(),
                tier,
                trial_ends_at: None,
                privileged_override: false,
                created_at: now,
                updated_at: now,
            });
        entry.tier = tier;
        entry.updated_at = now;
        Ok(())
    }

    async fn simulate(&self) -> Result<(), DomainError> {
        let latency = *self.latency.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::database("in-memory repository marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl EntitlementRepository for InMemoryEntitlementRepository {
    async fn find(
        &self,
        identity: &IdentityId,
    ) -> Result<Option<SubscriberEntitlement>, DomainError> {
        self.simulate().await?;
        Ok(self.entitlements.read().await.get(identity).cloned())
    }

    async fn create_trial(
        &self,
        identity: &IdentityId,
        now: Timestamp,
        trial_days: i64,
    ) -> Result<SubscriberEntitlement, DomainError> {
        self.simulate().await?;
        let mut entitlements = self.entitlements.write().await;
        let entry = entitlements
            .entry(identity.clone())
            .or_insert_with(|| SubscriberEntitlement::new_trial(identity.clone(), now, trial_days));
        Ok(entry.clone())
    }
}
