//! RateLimitService - fail-safe degraded rate limiting.
//!
//! Every check goes to the durable counter store under a short timeout.
//! If the store errors or times out, the same window rule runs against the
//! process-local `FallbackCache` with a stricter limit. Callers always get
//! a decision, never an error.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::memory::FallbackCache;
use crate::domain::foundation::{Clock, IdentityId, Timestamp};
use crate::domain::metering::CounterDecision;
use crate::ports::{
    CounterStore, CounterStoreError, RateLimitDecision, RateLimitKey, RateLimitPath, RateLimiter,
};

/// A limit over a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub limit: u32,
    pub window: Duration,
}

impl WindowLimit {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }

    /// The stricter limit used on the fallback path: `ratio_percent` of
    /// the durable limit, rounded down, never below one.
    pub fn degraded(&self, ratio_percent: u32) -> WindowLimit {
        let scaled = u64::from(self.limit) * u64::from(ratio_percent.min(100)) / 100;
        WindowLimit {
            limit: u32::try_from(scaled).unwrap_or(self.limit).max(1),
            window: self.window,
        }
    }
}

/// Budgets for anonymous and authenticated callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub anonymous: WindowLimit,
    pub authenticated: WindowLimit,
    /// Fallback limit as a percentage of the durable one.
    pub fallback_ratio_percent: u32,
    /// Upper bound on one durable store call.
    pub store_timeout: Duration,
}

impl RateLimitPolicy {
    /// Durable limit for a key.
    pub fn limits_for(&self, key: &RateLimitKey) -> WindowLimit {
        match key {
            RateLimitKey::Ip(_) => self.anonymous,
            RateLimitKey::User(_) => self.authenticated,
        }
    }

    /// Fallback limit for a key.
    pub fn fallback_limits_for(&self, key: &RateLimitKey) -> WindowLimit {
        self.limits_for(key).degraded(self.fallback_ratio_percent)
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            anonymous: WindowLimit::new(20, Duration::from_secs(60)),
            authenticated: WindowLimit::new(100, Duration::from_secs(60)),
            fallback_ratio_percent: 50,
            store_timeout: Duration::from_millis(250),
        }
    }
}

/// Runs a durable store call under `timeout`, mapping expiry to `Timeout`.
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, CounterStoreError>
where
    F: Future<Output = Result<T, CounterStoreError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CounterStoreError::Timeout),
    }
}

/// Rate limiter composing the durable store with the fallback cache.
pub struct RateLimitService {
    store: Arc<dyn CounterStore>,
    fallback: Arc<FallbackCache>,
    policy: RateLimitPolicy,
    clock: Arc<dyn Clock>,
}

impl RateLimitService {
    pub fn new(
        store: Arc<dyn CounterStore>,
        fallback: Arc<FallbackCache>,
        policy: RateLimitPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            fallback,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Returns true if the caller may proceed.
    pub async fn check_limit(&self, ip: &str, identity: Option<&IdentityId>) -> bool {
        self.check_caller(ip, identity).await.allowed
    }

    /// Consumes one request and returns the full decision.
    pub async fn check_caller(&self, ip: &str, identity: Option<&IdentityId>) -> RateLimitDecision {
        let key = RateLimitKey::for_caller(ip, identity);
        let now = self.clock.now();
        let durable = self.policy.limits_for(&key);
        let counter_key = key.counter_key();

        let result = bounded(
            self.policy.store_timeout,
            self.store
                .read_and_advance(&counter_key, durable.window, durable.limit, now),
        )
        .await;

        match result {
            Ok(decision) => {
                if !decision.allowed {
                    tracing::debug!(key = %key, limit = decision.limit, "Rate limit exceeded");
                }
                to_decision(key, decision, RateLimitPath::Durable)
            }
            Err(e) => {
                let degraded = self.policy.fallback_limits_for(&key);
                tracing::warn!(
                    key = %key,
                    error = %e,
                    fallback_limit = degraded.limit,
                    "Counter store unavailable, using in-memory fallback"
                );
                let decision = self.fallback.read_and_advance(
                    &counter_key.storage_key(),
                    degraded.window,
                    degraded.limit,
                    now,
                );
                to_decision(key, decision, RateLimitPath::Fallback)
            }
        }
    }

    /// Reads the caller's durable budget without consuming.
    pub async fn caller_status(
        &self,
        ip: &str,
        identity: Option<&IdentityId>,
    ) -> Option<RateLimitDecision> {
        let key = RateLimitKey::for_caller(ip, identity);
        let now: Timestamp = self.clock.now();
        let limits = self.policy.limits_for(&key);

        let result = bounded(
            self.policy.store_timeout,
            self.store
                .peek(&key.counter_key(), limits.window, limits.limit, now),
        )
        .await;

        match result {
            Ok(decision) => Some(to_decision(key, decision, RateLimitPath::Durable)),
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Rate limit status unavailable");
                None
            }
        }
    }

    /// Clears a key in both the durable store and the fallback cache.
    pub async fn reset_key(&self, key: &RateLimitKey) -> Result<(), CounterStoreError> {
        let counter_key = key.counter_key();
        self.fallback.remove(&counter_key.storage_key());
        bounded(self.policy.store_timeout, self.store.reset(&counter_key)).await?;
        tracing::info!(key = %key, "Rate limit reset");
        Ok(())
    }
}

fn to_decision(key: RateLimitKey, decision: CounterDecision, path: RateLimitPath) -> RateLimitDecision {
    RateLimitDecision {
        key,
        allowed: decision.allowed,
        limit: decision.limit,
        remaining: decision.remaining,
        reset_at: decision.reset_at,
        path,
    }
}

#[async_trait]
impl RateLimiter for RateLimitService {
    async fn check(&self, ip: &str, identity: Option<&IdentityId>) -> RateLimitDecision {
        self.check_caller(ip, identity).await
    }

    async fn status(&self, ip: &str, identity: Option<&IdentityId>) -> Option<RateLimitDecision> {
        self.caller_status(ip, identity).await
    }

    async fn reset(&self, key: &RateLimitKey) -> Result<(), CounterStoreError> {
        self.reset_key(key).await
    }
}

impl std::fmt::Debug for RateLimitService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitService")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryCounterStore;
    use crate::domain::foundation::ManualClock;

    const DAY: Duration = Duration::from_secs(86_400);

    fn service_with(
        store: InMemoryCounterStore,
        policy: RateLimitPolicy,
    ) -> (RateLimitService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(1_700_000_000_000)));
        let service = RateLimitService::new(
            Arc::new(store),
            Arc::new(FallbackCache::new(100)),
            policy,
            clock.clone(),
        );
        (service, clock)
    }

    fn policy(anon: u32, auth: u32) -> RateLimitPolicy {
        RateLimitPolicy {
            anonymous: WindowLimit::new(anon, Duration::from_secs(60)),
            authenticated: WindowLimit::new(auth, Duration::from_secs(60)),
            ..RateLimitPolicy::default()
        }
    }

    #[test]
    fn degraded_limit_is_half_by_default() {
        assert_eq!(WindowLimit::new(20, DAY).degraded(50).limit, 10);
        assert_eq!(WindowLimit::new(3, DAY).degraded(50).limit, 1);
    }

    #[test]
    fn degraded_limit_never_reaches_zero() {
        assert_eq!(WindowLimit::new(1, DAY).degraded(10).limit, 1);
    }

    #[tokio::test]
    async fn anonymous_caller_denied_after_limit() {
        let mut p = policy(3, 100);
        p.anonymous.window = DAY;
        let (service, _) = service_with(InMemoryCounterStore::new(), p);

        for _ in 0..3 {
            assert!(service.check_limit("203.0.113.5", None).await);
        }
        let fourth = service.check_caller("203.0.113.5", None).await;

        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
        assert_eq!(fourth.path, RateLimitPath::Durable);
    }

    #[tokio::test]
    async fn identity_uses_authenticated_budget() {
        let (service, _) = service_with(InMemoryCounterStore::new(), policy(1, 5));
        let id = IdentityId::new("u1").unwrap();

        for _ in 0..5 {
            assert!(service.check_limit("10.0.0.1", Some(&id)).await);
        }
        assert!(!service.check_limit("10.0.0.1", Some(&id)).await);
        // Address budget is separate.
        assert!(service.check_limit("10.0.0.1", None).await);
    }

    #[tokio::test]
    async fn window_reset_restores_budget() {
        let (service, clock) = service_with(InMemoryCounterStore::new(), policy(2, 100));
        service.check_limit("10.0.0.1", None).await;
        service.check_limit("10.0.0.1", None).await;
        assert!(!service.check_limit("10.0.0.1", None).await);

        clock.advance(Duration::from_secs(60));
        let decision = service.check_caller("10.0.0.1", None).await;

        assert!(decision.allowed);
        assert_eq!(decision.reset_at, clock.now().plus(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn outage_falls_back_to_stricter_limit() {
        let store = InMemoryCounterStore::new();
        store.set_available(false);
        let (service, _) = service_with(store, policy(10, 100));

        let mut admitted = 0;
        for _ in 0..10 {
            let decision = service.check_caller("10.0.0.1", None).await;
            assert_eq!(decision.path, RateLimitPath::Fallback);
            if decision.allowed {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out_to_fallback() {
        let store = InMemoryCounterStore::new();
        store.set_latency(Some(Duration::from_secs(5)));
        let (service, _) = service_with(store, policy(10, 100));

        let decision = service.check_caller("10.0.0.1", None).await;

        assert!(decision.allowed);
        assert_eq!(decision.path, RateLimitPath::Fallback);
        assert_eq!(decision.limit, 5);
    }

    #[tokio::test]
    async fn status_does_not_consume() {
        let (service, _) = service_with(InMemoryCounterStore::new(), policy(3, 100));
        service.check_limit("10.0.0.1", None).await;

        let status = service.caller_status("10.0.0.1", None).await.unwrap();
        let again = service.caller_status("10.0.0.1", None).await.unwrap();

        assert_eq!(status.remaining, 2);
        assert_eq!(again.remaining, 2);
    }

    #[tokio::test]
    async fn status_is_none_during_outage() {
        let store = InMemoryCounterStore::new();
        store.set_available(false);
        let (service, _) = service_with(store, policy(3, 100));

        assert!(service.caller_status("10.0.0.1", None).await.is_none());
    }

    #[tokio::test]
    async fn reset_restores_full_budget() {
        let (service, _) = service_with(InMemoryCounterStore::new(), policy(1, 100));
        service.check_limit("10.0.0.1", None).await;
        assert!(!service.check_limit("10.0.0.1", None).await);

        service
            .reset_key(&RateLimitKey::Ip("10.0.0.1".to_string()))
            .await
            .unwrap();

        assert!(service.check_limit("10.0.0.1", None).await);
    }
}
