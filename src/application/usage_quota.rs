//! UsageQuotaTracker - per-identity, per-feature allowances.
//!
//! Same bounded-counter primitive as rate limiting, keyed
//! `usage:<identity>:<feature>` and sized by the feature's quota and
//! period. A unit is consumed before the feature's work runs and is not
//! refunded if that work fails.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::rate_limit::bounded;
use crate::adapters::memory::FallbackCache;
use crate::domain::entitlement::Feature;
use crate::domain::foundation::{Clock, IdentityId, Timestamp};
use crate::domain::metering::{AccessError, CounterDecision, QuotaDecision, QuotaPolicy};
use crate::ports::{CounterKey, CounterStore};

/// Tracks quota consumption against the counter store.
pub struct UsageQuotaTracker {
    store: Arc<dyn CounterStore>,
    fallback: Arc<FallbackCache>,
    quotas: HashMap<Feature, QuotaPolicy>,
    store_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl UsageQuotaTracker {
    pub fn new(
        store: Arc<dyn CounterStore>,
        fallback: Arc<FallbackCache>,
        quotas: HashMap<Feature, QuotaPolicy>,
        store_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            fallback,
            quotas,
            store_timeout,
            clock,
        }
    }

    /// Configured policy for a feature, if metered.
    pub fn policy_for(&self, feature: Feature) -> Option<QuotaPolicy> {
        self.quotas.get(&feature).copied()
    }

    /// Consumes one unit of `feature` using its configured quota.
    ///
    /// Features without a quota are unmetered and always allowed.
    ///
    /// # Errors
    ///
    /// `QuotaExceeded` when this period's allowance is used up.
    pub async fn check_and_consume(
        &self,
        identity: &IdentityId,
        feature: Feature,
    ) -> Result<QuotaDecision, AccessError> {
        let Some(policy) = self.policy_for(feature) else {
            return Ok(QuotaDecision::unmetered(feature));
        };

        let decision = self
            .check_and_consume_with(identity, feature, policy.quota, policy.period.duration())
            .await;
        into_result(decision)
    }

    /// Consumes one unit against an explicit quota and period.
    pub async fn check_and_consume_with(
        &self,
        identity: &IdentityId,
        feature: Feature,
        quota: u32,
        period: Duration,
    ) -> QuotaDecision {
        let key = CounterKey::usage(identity, feature);
        let now = self.clock.now();

        let result = bounded(
            self.store_timeout,
            self.store.read_and_advance(&key, period, quota, now),
        )
        .await;

        let counter = match result {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    "Counter store unavailable, metering quota in memory"
                );
                self.fallback
                    .read_and_advance(&key.storage_key(), period, quota, now)
            }
        };

        if !counter.allowed {
            tracing::info!(identity = %identity, feature = %feature, "Quota exhausted");
        }
        to_quota_decision(feature, counter)
    }

    /// Reads the remaining allowance without consuming.
    pub async fn status(
        &self,
        identity: &IdentityId,
        feature: Feature,
    ) -> Result<QuotaDecision, AccessError> {
        let Some(policy) = self.policy_for(feature) else {
            return Ok(QuotaDecision::unmetered(feature));
        };
        let key = CounterKey::usage(identity, feature);
        let period = policy.period.duration();
        let now = self.clock.now();

        let counter = match bounded(
            self.store_timeout,
            self.store.peek(&key, period, policy.quota, now),
        )
        .await
        {
            Ok(decision) => decision,
            Err(_) => self
                .fallback
                .peek(&key.storage_key(), period, policy.quota, now),
        };
        Ok(to_quota_decision(feature, counter))
    }

    /// Consumes one unit, then runs `work` only if the unit was granted.
    ///
    /// The unit stays consumed whatever `work` returns.
    pub async fn metered<F, Fut, T>(
        &self,
        identity: &IdentityId,
        feature: Feature,
        work: F,
    ) -> Result<T, AccessError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.check_and_consume(identity, feature).await?;
        Ok(work().await)
    }
}

fn to_quota_decision(feature: Feature, counter: CounterDecision) -> QuotaDecision {
    QuotaDecision {
        feature,
        allowed: counter.allowed,
        limit: Some(counter.limit),
        remaining: counter.remaining,
        resets_at: Some(counter.reset_at),
    }
}

fn into_result(decision: QuotaDecision) -> Result<QuotaDecision, AccessError> {
    if decision.allowed {
        return Ok(decision);
    }
    Err(AccessError::QuotaExceeded {
        feature: decision.feature,
        limit: decision.limit.unwrap_or(0),
        resets_at: decision
            .resets_at
            .unwrap_or_else(Timestamp::now),
    })
}

impl std::fmt::Debug for UsageQuotaTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageQuotaTracker")
            .field("quotas", &self.quotas)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}
