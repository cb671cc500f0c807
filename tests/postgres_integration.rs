//! Database-backed tests for the PostgreSQL adapters.
//!
//! Ignored by default. Run against a scratch database with:
//!
//! ```text
//! TEST_DATABASE_URL=postgres://localhost/access_meter_test \
//!     cargo test --test postgres_integration -- --ignored
//! ```
//!
//! Keys and event ids carry a per-run suffix, so the tests can share one
//! database and run in parallel.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use access_meter::adapters::{PostgresCounterStore, PostgresEntitlementRepository, PostgresPaymentLedger};
use access_meter::domain::billing::PaymentEvent;
use access_meter::domain::entitlement::{Feature, SubscriptionTier};
use access_meter::domain::foundation::{IdentityId, Timestamp};
use access_meter::ports::{CounterKey, CounterStore, EntitlementRepository, LedgerOutcome, PaymentLedger};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(86_400);

async fn pool() -> PgPool {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(25)
        .connect(&url)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn unique(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}-{}-{}", prefix, std::process::id(), nanos)
}

fn event(id: &str, event_type: &str, identity: &IdentityId, tier: Option<&str>) -> PaymentEvent {
    let tier = tier.map(|t| format!(r#","tier":"{}""#, t)).unwrap_or_default();
    let body = format!(
        r#"{{"id":"{}","type":"{}","data":{{"identity_id":"{}"{}}}}}"#,
        id, event_type, identity, tier
    );
    PaymentEvent::from_slice(body.as_bytes()).unwrap()
}

// =============================================================================
// Counter store
// =============================================================================

#[tokio::test]
#[ignore]
async fn concurrent_callers_admit_exactly_limit() {
    let store = Arc::new(PostgresCounterStore::new(pool().await));
    let key = CounterKey::ip(unique("10.9.0.1"));
    let now = Timestamp::now();
    let limit = 10;

    let handles: Vec<_> = (0..limit * 2)
        .map(|_| {
            let store = Arc::clone(&store);
            let key = key.clone();
            tokio::spawn(async move { store.read_and_advance(&key, MINUTE, limit, now).await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().allowed {
            admitted += 1;
        }
    }

    assert_eq!(admitted, limit);
    assert_eq!(store.peek(&key, MINUTE, limit, now).await.unwrap().count, limit);
}

#[tokio::test]
#[ignore]
async fn concurrent_usage_callers_admit_exactly_quota() {
    let store = Arc::new(PostgresCounterStore::new(pool().await));
    let identity = IdentityId::new(unique("quota-user")).unwrap();
    let key = CounterKey::usage(&identity, Feature::DocGenerator);
    let now = Timestamp::now();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let store = Arc::clone(&store);
            let key = key.clone();
            tokio::spawn(async move { store.read_and_advance(&key, DAY, 3, now).await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap().allowed {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 3);
}

#[tokio::test]
#[ignore]
async fn window_end_restarts_count() {
    let store = PostgresCounterStore::new(pool().await);
    let key = CounterKey::ip(unique("10.9.0.2"));
    let now = Timestamp::now();

    for _ in 0..2 {
        store.read_and_advance(&key, MINUTE, 2, now).await.unwrap();
    }
    assert!(!store.read_and_advance(&key, MINUTE, 2, now).await.unwrap().allowed);

    let later = now.plus(MINUTE);
    let decision = store.read_and_advance(&key, MINUTE, 2, later).await.unwrap();

    assert!(decision.allowed);
    assert_eq!(decision.count, 1);
    assert_eq!(decision.reset_at.as_unix_millis(), later.plus(MINUTE).as_unix_millis());
}

#[tokio::test]
#[ignore]
async fn reset_between_calls_is_recorded_again() {
    let store = PostgresCounterStore::new(pool().await);
    let key = CounterKey::ip(unique("10.9.0.3"));
    let now = Timestamp::now();
    store.read_and_advance(&key, MINUTE, 5, now).await.unwrap();

    store.reset(&key).await.unwrap();
    let decision = store.read_and_advance(&key, MINUTE, 5, now).await.unwrap();

    assert_eq!(decision.count, 1);
    assert_eq!(store.peek(&key, MINUTE, 5, now).await.unwrap().count, 1);
}

#[tokio::test]
#[ignore]
async fn zero_limit_creates_no_row() {
    let store = PostgresCounterStore::new(pool().await);
    let key = CounterKey::ip(unique("10.9.0.4"));
    let now = Timestamp::now();

    assert!(!store.read_and_advance(&key, MINUTE, 0, now).await.unwrap().allowed);
    assert_eq!(store.peek(&key, MINUTE, 5, now).await.unwrap().count, 0);
}

#[tokio::test]
#[ignore]
async fn sweep_removes_only_expired_rate_rows() {
    let pool = pool().await;
    let store = PostgresCounterStore::new(pool.clone());
    let now = Timestamp::now();
    let expired = CounterKey::ip(unique("10.9.0.5"));
    let live = CounterKey::ip(unique("10.9.0.6"));
    let identity = IdentityId::new(unique("sweep-user")).unwrap();
    let usage = CounterKey::usage(&identity, Feature::Chat);

    store.read_and_advance(&expired, Duration::from_secs(1), 5, now).await.unwrap();
    store.read_and_advance(&live, DAY, 5, now).await.unwrap();
    store.read_and_advance(&usage, Duration::from_secs(1), 5, now).await.unwrap();

    let later = now.plus(Duration::from_secs(2));
    let removed = store.sweep_expired(later).await.unwrap();

    assert!(removed >= 1);
    assert_eq!(store.peek(&expired, Duration::from_secs(1), 5, later).await.unwrap().count, 0);
    assert_eq!(store.peek(&live, DAY, 5, later).await.unwrap().count, 1);

    let usage_row: Option<(i32,)> = sqlx::query_as(
        "SELECT count FROM usage_counters WHERE identity_id = $1 AND feature = 'CHAT'",
    )
    .bind(identity.as_str())
    .fetch_optional(&pool)
    .await
    .unwrap();
    assert_eq!(usage_row.map(|r| r.0), Some(1));
}

// =============================================================================
// Entitlements and payment ledger
// =============================================================================

#[tokio::test]
#[ignore]
async fn concurrent_first_sight_agrees_on_one_trial() {
    let repo = Arc::new(PostgresEntitlementRepository::new(pool().await));
    let identity = IdentityId::new(unique("trial-user")).unwrap();
    let now = Timestamp::now();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let repo = Arc::clone(&repo);
            let identity = identity.clone();
            let at = now.plus(Duration::from_millis(i));
            tokio::spawn(async move { repo.create_trial(&identity, at, 7).await })
        })
        .collect();

    let mut trials = Vec::new();
    for handle in handles {
        trials.push(handle.await.unwrap().unwrap());
    }

    assert!(trials.windows(2).all(|pair| pair[0].trial_ends_at == pair[1].trial_ends_at));
    assert_eq!(trials[0].tier, SubscriptionTier::Free);
}

#[tokio::test]
#[ignore]
async fn concurrent_duplicate_delivery_applies_once() {
    let pool = pool().await;
    let ledger = Arc::new(PostgresPaymentLedger::new(pool.clone()));
    let repo = PostgresEntitlementRepository::new(pool.clone());
    let counters = PostgresCounterStore::new(pool);
    let identity = IdentityId::new(unique("payer")).unwrap();
    let usage = CounterKey::usage(&identity, Feature::DocGenerator);
    let now = Timestamp::now();
    counters.read_and_advance(&usage, DAY, 3, now).await.unwrap();

    let upgrade = event(&unique("evt"), "payment.succeeded", &identity, Some("plus"));
    let change = upgrade.entitlement_change().unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let upgrade = upgrade.clone();
            let change = change.clone();
            tokio::spawn(async move { ledger.apply_once(&upgrade, change.as_ref(), now).await })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() == LedgerOutcome::Applied {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    assert!(ledger.contains(&upgrade.id).await.unwrap());
    assert_eq!(repo.find(&identity).await.unwrap().unwrap().tier, SubscriptionTier::Plus);
    assert_eq!(counters.peek(&usage, DAY, 3, now).await.unwrap().count, 0);
}

#[tokio::test]
#[ignore]
async fn replayed_event_does_not_undo_later_change() {
    let pool = pool().await;
    let ledger = PostgresPaymentLedger::new(pool.clone());
    let repo = PostgresEntitlementRepository::new(pool);
    let identity = IdentityId::new(unique("churner")).unwrap();
    let now = Timestamp::now();

    let upgrade = event(&unique("evt-up"), "payment.succeeded", &identity, Some("pro"));
    let cancel = event(&unique("evt-cancel"), "subscription.cancelled", &identity, None);
    for e in [&upgrade, &cancel] {
        let change = e.entitlement_change().unwrap();
        ledger.apply_once(e, change.as_ref(), now).await.unwrap();
    }

    let change = upgrade.entitlement_change().unwrap();
    let replay = ledger.apply_once(&upgrade, change.as_ref(), now).await.unwrap();

    assert_eq!(replay, LedgerOutcome::AlreadyProcessed);
    assert_eq!(
        repo.find(&identity).await.unwrap().unwrap().tier,
        SubscriptionTier::ExpiredFree
    );
}
