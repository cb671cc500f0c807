//! In-memory counter store for testing and single-process development.
//!
//! Not suitable for multi-server deployments. Can simulate outages and
//! slow responses so the fallback path can be exercised.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::domain::foundation::{IdentityId, Timestamp};
use crate::domain::metering::window::{self, CounterDecision, WindowCounter};
use crate::ports::{CounterKey, CounterStore, CounterStoreError};

/// In-memory counter store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCounterStore {
    counters: Arc<RwLock<HashMap<CounterKey, WindowCounter>>>,
    unavailable: Arc<AtomicBool>,
    latency: Arc<Mutex<Option<Duration>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail with `Unavailable` until switched back.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|p| p.into_inner()) = latency;
    }

    /// Deletes every usage counter of `identity`.
    pub async fn clear_usage(&self, identity: &IdentityId) {
        self.counters.write().await.retain(|key, _| match key {
            CounterKey::Usage { identity: owner, .. } => owner != identity,
            _ => true,
        });
    }

    /// Stored state of one key.
    pub async fn get(&self, key: &CounterKey) -> Option<WindowCounter> {
        self.counters.read().await.get(key).copied()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.counters.read().await.len()
    }

    async fn simulate(&self) -> Result<(), CounterStoreError> {
        let latency = *self.latency.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CounterStoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn read_and_advance(
        &self,
        key: &CounterKey,
        window: Duration,
        limit: u32,
        now: Timestamp,
    ) -> Result<CounterDecision, CounterStoreError> {
        self.simulate().await?;

        let mut counters = self.counters.write().await;
        let (next, decision) = window::advance(counters.get(key).copied(), window, limit, now);
        if let Some(next) = next {
            counters.insert(key.clone(), next);
        }
        Ok(decision)
    }

    async fn peek(
        &self,
        key: &CounterKey,
        window: Duration,
        limit: u32,
        now: Timestamp,
    ) -> Result<CounterDecision, CounterStoreError> {
        self.simulate().await?;

        let counters = self.counters.read().await;
        Ok(window::peek(counters.get(key).copied(), window, limit, now))
    }

    async fn reset(&self, key: &CounterKey) -> Result<(), CounterStoreError> {
        self.simulate().await?;
        self.counters.write().await.remove(key);
        Ok(())
    }

    async fn sweep_expired(&self, now: Timestamp) -> Result<u64, CounterStoreError> {
        self.simulate().await?;

        let mut counters = self.counters.write().await;
        let before = counters.len();
        counters.retain(|key, counter| key.is_usage() || !counter.is_expired(&now));
        Ok((before - counters.len()) as u64)
    }
}
