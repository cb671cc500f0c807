//! AccessGate - the per-request decision in order: rate limit, then
//! entitlement, then quota.
//!
//! Callers without an identity only reach features on the anonymous list.
//! Their use is metered by the per-address rate budget, since there is no
//! identity to hang a quota on.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::usage_quota::UsageQuotaTracker;
use crate::domain::entitlement::{anonymous_tier, EntitlementResolver, Feature, SubscriberEntitlement, SubscriptionTier};
use crate::domain::foundation::{Clock, DomainError, IdentityId, Timestamp};
use crate::domain::metering::{AccessError, QuotaDecision};
use crate::ports::{EntitlementRepository, RateLimitDecision, RateLimiter};

/// Bound on one entitlement store call unless configured otherwise.
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

/// Everything the caller needs after a request is let through.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub rate_limit: RateLimitDecision,
    /// Tier in force for the caller.
    pub tier: SubscriptionTier,
    pub quota: QuotaDecision,
}

/// Composes rate limiting, entitlement resolution, and quota tracking.
pub struct AccessGate {
    rate_limiter: Arc<dyn RateLimiter>,
    entitlements: Arc<dyn EntitlementRepository>,
    resolver: EntitlementResolver,
    quotas: Arc<UsageQuotaTracker>,
    clock: Arc<dyn Clock>,
    trial_days: i64,
    anonymous_features: HashSet<Feature>,
    store_timeout: Duration,
}

impl AccessGate {
    pub fn new(
        rate_limiter: Arc<dyn RateLimiter>,
        entitlements: Arc<dyn EntitlementRepository>,
        resolver: EntitlementResolver,
        quotas: Arc<UsageQuotaTracker>,
        clock: Arc<dyn Clock>,
        trial_days: i64,
    ) -> Self {
        Self {
            rate_limiter,
            entitlements,
            resolver,
            quotas,
            clock,
            trial_days,
            anonymous_features: HashSet::new(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Opens `features` to callers without an identity.
    pub fn with_anonymous_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        self.anonymous_features.extend(features);
        self
    }

    /// Bounds each entitlement store call.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Decides whether a request for `feature` may run.
    ///
    /// # Errors
    ///
    /// - `RateLimitExceeded` - caller is over its request budget
    /// - `FeatureLocked` - anonymous caller and the feature is not on the
    ///   anonymous list, or the tier lacks the feature
    /// - `QuotaExceeded` - feature allowance used up for this period
    /// - `EntitlementUnavailable` - entitlement record could not be read in time
    pub async fn authorize(
        &self,
        ip: &str,
        identity: Option<&IdentityId>,
        feature: Feature,
    ) -> Result<GateDecision, AccessError> {
        let now = self.clock.now();

        let rate_limit = self.rate_limiter.check(ip, identity).await.into_result(&now)?;

        let Some(identity) = identity else {
            return self.authorize_anonymous(rate_limit, feature);
        };

        let entitlement = self.load_entitlement(identity, now).await?;
        self.resolver.require_access(&entitlement, feature, &now)?;

        let quota = self.quotas.check_and_consume(identity, feature).await?;

        Ok(GateDecision {
            rate_limit,
            tier: entitlement.effective_tier(&now),
            quota,
        })
    }

    /// Like [`authorize`](Self::authorize) for a feature given by name.
    ///
    /// Unknown names are locked for every caller, after the rate limit is
    /// applied.
    pub async fn authorize_named(
        &self,
        ip: &str,
        identity: Option<&IdentityId>,
        feature: &str,
    ) -> Result<GateDecision, AccessError> {
        match feature.parse::<Feature>() {
            Ok(feature) => self.authorize(ip, identity, feature).await,
            Err(_) => {
                let now = self.clock.now();
                self.rate_limiter.check(ip, identity).await.into_result(&now)?;
                Err(AccessError::FeatureLocked {
                    feature: feature.to_string(),
                    tier: anonymous_tier(),
                    required_tier: None,
                })
            }
        }
    }

    /// The address budget already consumed in `rate_limit` is the meter.
    fn authorize_anonymous(
        &self,
        rate_limit: RateLimitDecision,
        feature: Feature,
    ) -> Result<GateDecision, AccessError> {
        if !self.anonymous_features.contains(&feature) {
            return Err(AccessError::FeatureLocked {
                feature: feature.as_str().to_string(),
                tier: anonymous_tier(),
                required_tier: self.resolver.table().minimum_tier_for(feature),
            });
        }

        let quota = QuotaDecision {
            feature,
            allowed: true,
            limit: Some(rate_limit.limit),
            remaining: rate_limit.remaining,
            resets_at: Some(rate_limit.reset_at),
        };
        Ok(GateDecision {
            rate_limit,
            tier: anonymous_tier(),
            quota,
        })
    }

    /// Current entitlement, provisioning a FREE trial on first sight.
    async fn load_entitlement(
        &self,
        identity: &IdentityId,
        now: Timestamp,
    ) -> Result<SubscriberEntitlement, AccessError> {
        let found = self
            .bounded(identity, "lookup", self.entitlements.find(identity))
            .await?;

        match found {
            Some(entitlement) => Ok(entitlement),
            None => {
                tracing::info!(identity = %identity, trial_days = self.trial_days, "Provisioning trial entitlement");
                self.bounded(
                    identity,
                    "trial creation",
                    self.entitlements.create_trial(identity, now, self.trial_days),
                )
                .await
            }
        }
    }

    /// Runs one entitlement store call under the store timeout. Failures
    /// and timeouts both fail closed.
    async fn bounded<T, F>(&self, identity: &IdentityId, operation: &'static str, call: F) -> Result<T, AccessError>
    where
        F: Future<Output = Result<T, DomainError>>,
    {
        let error = match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("entitlement {} timed out after {:?}", operation, self.store_timeout),
        };
        tracing::error!(identity = %identity, operation, error = %error, "Entitlement store call failed");
        Err(AccessError::EntitlementUnavailable(error))
    }
}

impl std::fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGate")
            .field("trial_days", &self.trial_days)
            .field("anonymous_features", &self.anonymous_features)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}
