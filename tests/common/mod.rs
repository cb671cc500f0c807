//! Shared wiring for integration tests: every adapter in memory, one
//! manual clock.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use access_meter::adapters::{FallbackCache, InMemoryCounterStore, InMemoryEntitlementRepository, InMemoryPaymentLedger};
use access_meter::application::{
    AccessGate, HandlePaymentWebhookHandler, RateLimitPolicy, RateLimitService, UsageQuotaTracker, WindowLimit,
};
use access_meter::domain::billing::WebhookVerifier;
use access_meter::domain::entitlement::{EntitlementResolver, Feature};
use access_meter::domain::foundation::{ManualClock, Timestamp};
use access_meter::domain::metering::QuotaPolicy;
use secrecy::SecretString;

pub const SECRET: &str = "whsec_integration";
pub const DAY: Duration = Duration::from_secs(86_400);

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: InMemoryCounterStore,
    pub repo: InMemoryEntitlementRepository,
    pub fallback: Arc<FallbackCache>,
    pub limiter: Arc<RateLimitService>,
    pub quotas: Arc<UsageQuotaTracker>,
    pub gate: AccessGate,
    pub webhooks: HandlePaymentWebhookHandler,
}

pub fn start() -> Timestamp {
    Timestamp::from_unix_millis(1_700_000_000_000)
}

pub fn harness(anonymous: WindowLimit, authenticated: WindowLimit) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let store = InMemoryCounterStore::new();
    let repo = InMemoryEntitlementRepository::new();
    let fallback = Arc::new(FallbackCache::new(1_000));

    let policy = RateLimitPolicy {
        anonymous,
        authenticated,
        ..RateLimitPolicy::default()
    };
    let limiter = Arc::new(RateLimitService::new(
        Arc::new(store.clone()),
        fallback.clone(),
        policy,
        clock.clone(),
    ));
    let quotas = Arc::new(UsageQuotaTracker::new(
        Arc::new(store.clone()),
        fallback.clone(),
        HashMap::from([
            (Feature::DocGenerator, QuotaPolicy::daily(3)),
            (Feature::Chat, QuotaPolicy::daily(50)),
        ]),
        Duration::from_millis(250),
        clock.clone(),
    ));
    let gate = AccessGate::new(
        limiter.clone(),
        Arc::new(repo.clone()),
        EntitlementResolver::default(),
        quotas.clone(),
        clock.clone(),
        7,
    );
    let webhooks = HandlePaymentWebhookHandler::new(
        WebhookVerifier::new(SecretString::new(SECRET.to_string())),
        Arc::new(InMemoryPaymentLedger::new(repo.clone(), store.clone())),
        clock.clone(),
    );

    Harness {
        clock,
        store,
        repo,
        fallback,
        limiter,
        quotas,
        gate,
        webhooks,
    }
}

pub fn default_harness() -> Harness {
    harness(
        WindowLimit::new(20, Duration::from_secs(60)),
        WindowLimit::new(100, Duration::from_secs(60)),
    )
}
