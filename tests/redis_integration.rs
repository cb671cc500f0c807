//! Tests for the Redis counter store against a live server.
//!
//! Ignored by default. Run with:
//!
//! ```text
//! TEST_REDIS_URL=redis://127.0.0.1/ cargo test --test redis_integration -- --ignored
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use access_meter::adapters::RedisCounterStore;
use access_meter::domain::foundation::Timestamp;
use access_meter::ports::{CounterKey, CounterStore};

const MINUTE: Duration = Duration::from_secs(60);

async fn store() -> RedisCounterStore {
    let url = std::env::var("TEST_REDIS_URL").expect("TEST_REDIS_URL must be set");
    let client = redis::Client::open(url).unwrap();
    let conn = client.get_multiplexed_tokio_connection().await.unwrap();
    RedisCounterStore::new(conn)
}

fn unique_ip() -> CounterKey {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    CounterKey::ip(format!("test-{}-{}", std::process::id(), nanos))
}

#[tokio::test]
#[ignore]
async fn fresh_key_starts_a_window() {
    let store = store().await;
    let key = unique_ip();
    let now = Timestamp::now();

    let decision = store.read_and_advance(&key, MINUTE, 3, now).await.unwrap();

    assert!(decision.allowed);
    assert_eq!(decision.count, 1);
    assert_eq!(decision.remaining, 2);
    assert_eq!(decision.reset_at.as_unix_millis(), now.plus(MINUTE).as_unix_millis());
}

#[tokio::test]
#[ignore]
async fn live_window_counts_up_then_denies() {
    let store = store().await;
    let key = unique_ip();
    let now = Timestamp::now();

    let mut counts = Vec::new();
    for _ in 0..3 {
        counts.push(store.read_and_advance(&key, MINUTE, 3, now).await.unwrap().count);
    }
    let denied = store.read_and_advance(&key, MINUTE, 3, now).await.unwrap();

    assert_eq!(counts, vec![1, 2, 3]);
    assert!(!denied.allowed);
    assert_eq!(denied.count, 3);
    assert_eq!(denied.remaining, 0);
}

#[tokio::test]
#[ignore]
async fn ended_window_restarts() {
    let store = store().await;
    let key = unique_ip();
    let now = Timestamp::now();
    for _ in 0..2 {
        store.read_and_advance(&key, MINUTE, 2, now).await.unwrap();
    }

    let later = now.plus(MINUTE);
    let decision = store.read_and_advance(&key, MINUTE, 2, later).await.unwrap();

    assert!(decision.allowed);
    assert_eq!(decision.count, 1);
}

#[tokio::test]
#[ignore]
async fn zero_limit_denies_without_creating_key() {
    let store = store().await;
    let key = unique_ip();
    let now = Timestamp::now();

    let decision = store.read_and_advance(&key, MINUTE, 0, now).await.unwrap();

    assert!(!decision.allowed);
    assert_eq!(store.peek(&key, MINUTE, 5, now).await.unwrap().count, 0);
}

#[tokio::test]
#[ignore]
async fn reset_clears_the_window() {
    let store = store().await;
    let key = unique_ip();
    let now = Timestamp::now();
    store.read_and_advance(&key, MINUTE, 1, now).await.unwrap();

    store.reset(&key).await.unwrap();

    assert!(store.read_and_advance(&key, MINUTE, 1, now).await.unwrap().allowed);
}

#[tokio::test]
#[ignore]
async fn concurrent_callers_admit_exactly_limit() {
    let store = Arc::new(store().await);
    let key = unique_ip();
    let now = Timestamp::now();
    let limit = 25;

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
}
