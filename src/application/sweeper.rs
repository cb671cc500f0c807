//! Sweeper - background removal of expired rate-limit windows.
//!
//! Runs `CounterStore::sweep_expired` and purges the fallback cache on a
//! fixed interval. Failures are logged and retried on the next tick.
//!
//! ## Graceful Shutdown
//!
//! Listens on a watch channel and runs one final sweep before stopping.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

use crate::adapters::memory::FallbackCache;
use crate::domain::foundation::Clock;
use crate::ports::CounterStore;

/// Periodic sweep of expired counters.
pub struct Sweeper {
    store: Arc<dyn CounterStore>,
    fallback: Arc<FallbackCache>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

/// Counts removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub durable: u64,
    pub fallback: usize,
}

impl Sweeper {
    pub fn new(
        store: Arc<dyn CounterStore>,
        fallback: Arc<FallbackCache>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            fallback,
            clock,
            interval,
        }
    }

    /// Run the sweep loop until shutdown signal is received.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.sweep_once().await;
                        tracing::info!("Sweeper stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }

    /// Run exactly one sweep.
    pub async fn sweep_once(&self) -> SweepReport {
        let now = self.clock.now();

        let durable = match self.store.sweep_expired(now).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(error = %e, "Counter sweep failed, retrying next tick");
                0
            }
        };
        let fallback = self.fallback.purge_expired(now);

        if durable > 0 || fallback > 0 {
            tracing::debug!(durable, fallback, "Swept expired counters");
        }
        SweepReport { durable, fallback }
    }
}

/// Spawns the sweeper on the tokio runtime.
pub fn spawn_sweeper(
    store: Arc<dyn CounterStore>,
    fallback: Arc<FallbackCache>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let sweeper = Sweeper::new(store, fallback, clock, interval);
    tokio::spawn(async move { sweeper.run(shutdown).await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryCounterStore;
    use crate::domain::foundation::{IdentityId, ManualClock, Timestamp};
    use crate::domain::entitlement::Feature;
    use crate::ports::CounterKey;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn sweep_removes_expired_windows_only() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(0)));
        let store = InMemoryCounterStore::new();
        let fallback = Arc::new(FallbackCache::new(10));
        let id = IdentityId::new("u1").unwrap();
        let t0 = clock.now();

        store.read_and_advance(&CounterKey::ip("1.1.1.1"), MINUTE, 5, t0).await.unwrap();
        store
            .read_and_advance(&CounterKey::usage(&id, Feature::Chat), MINUTE, 5, t0)
            .await
            .unwrap();
        fallback.read_and_advance("ip:2.2.2.2", MINUTE, 5, t0);

        let sweeper = Sweeper::new(Arc::new(store.clone()), fallback.clone(), clock.clone(), MINUTE);
        assert_eq!(sweeper.sweep_once().await, SweepReport::default());

        clock.advance(MINUTE);
        let report = sweeper.sweep_once().await;

        assert_eq!(report, SweepReport { durable: 1, fallback: 1 });
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn store_failure_does_not_stop_sweeping() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(0)));
        let store = InMemoryCounterStore::new();
        store.set_available(false);
        let fallback = Arc::new(FallbackCache::new(10));
        fallback.read_and_advance("ip:2.2.2.2", MINUTE, 5, clock.now());
        clock.advance(MINUTE);

        let sweeper = Sweeper::new(Arc::new(store), fallback, clock, MINUTE);

        assert_eq!(sweeper.sweep_once().await.fallback, 1);
    }

    #[tokio::test]
    async fn spawned_sweeper_stops_on_shutdown() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_millis(0)));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(
            Arc::new(InMemoryCounterStore::new()),
            Arc::new(FallbackCache::new(10)),
            clock,
            Duration::from_millis(10),
            rx,
        );

        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
