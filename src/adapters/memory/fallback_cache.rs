//! Process-local fallback counters.
//!
//! Used when the durable counter store cannot be reached. The map is
//! bounded: once full, expired windows are purged and then the
//! least-recently-touched rate-limit key is evicted to admit a new one.
//!
//! Usage-quota windows are never evicted while live, so a flood of new
//! addresses cannot hand an identity a fresh quota mid-period. When only
//! live usage windows remain, a new key is denied instead of tracked.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::domain::foundation::Timestamp;
use crate::domain::metering::window::{self, CounterDecision, WindowCounter};
use crate::ports::CounterKey;

#[derive(Debug)]
struct Entry {
    counter: WindowCounter,
    /// Access sequence number, for LRU eviction.
    touched: u64,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    seq: u64,
}

/// Bounded in-memory counter map guarded by one lock.
///
/// Counts are local to the process; with N processes in fallback the
/// effective limit is N times the configured one.
#[derive(Debug)]
pub struct FallbackCache {
    state: Mutex<State>,
    max_entries: usize,
}

impl FallbackCache {
    /// Creates a cache holding at most `max_entries` keys (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_entries: max_entries.max(1),
        }
    }

    /// Applies one event to `key` using the fixed-window rule.
    pub fn read_and_advance(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
        now: Timestamp,
    ) -> CounterDecision {
        let mut state = self.lock();
        state.seq += 1;
        let seq = state.seq;

        let current = state.entries.get(key).map(|e| e.counter);
        let (next, decision) = window::advance(current, window, limit, now);

        if let Some(counter) = next {
            if current.is_none()
                && state.entries.len() >= self.max_entries
                && !Self::make_room(&mut state, self.max_entries, &now)
            {
                tracing::warn!(key = %key, "Fallback cache full of live usage windows, denying");
                return CounterDecision {
                    allowed: false,
                    count: 0,
                    limit,
                    remaining: 0,
                    reset_at: now.plus(window),
                };
            }
            state.entries.insert(
                key.to_string(),
                Entry {
                    counter,
                    touched: seq,
                },
            );
        } else if let Some(entry) = state.entries.get_mut(key) {
            entry.touched = seq;
        }

        decision
    }

    /// Reads the decision for `key` without consuming.
    pub fn peek(&self, key: &str, window: Duration, limit: u32, now: Timestamp) -> CounterDecision {
        let state = self.lock();
        window::peek(state.entries.get(key).map(|e| e.counter), window, limit, now)
    }

    /// Drops one key.
    pub fn remove(&self, key: &str) {
        self.lock().entries.remove(key);
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Removes expired windows. Returns how many were dropped.
    pub fn purge_expired(&self, now: Timestamp) -> usize {
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|_, e| !e.counter.is_expired(&now));
        before - state.entries.len()
    }

    /// Frees a slot. Returns false if only live usage windows are left.
    fn make_room(state: &mut State, max_entries: usize, now: &Timestamp) -> bool {
        state.entries.retain(|_, e| !e.counter.is_expired(now));

        while state.entries.len() >= max_entries {
            let oldest = state
                .entries
                .iter()
                .filter(|(k, _)| !CounterKey::is_usage_storage_key(k))
                .min_by_key(|(_, e)| e.touched)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(key) => {
                    tracing::debug!(key = %key, "Evicting fallback rate-limit entry");
                    state.entries.remove(&key);
                }
                None => return false,
            }
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const MINUTE: Duration = Duration::from_secs(60);

    fn t(millis: i64) -> Timestamp {
        Timestamp::from_unix_millis(millis)
    }

    #[test]
    fn admits_up_to_limit() {
        let cache = FallbackCache::new(10);
        for _ in 0..3 {
            assert!(cache.read_and_advance("ip:a", MINUTE, 3, t(0)).allowed);
        }
        let denied = cache.read_and_advance("ip:a", MINUTE, 3, t(0));
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
    }

    #[test]
    fn window_expiry_resets_count() {
        let cache = FallbackCache::new(10);
        for _ in 0..4 {
            cache.read_and_advance("ip:a", MINUTE, 3, t(0));
        }
        let decision = cache.read_and_advance("ip:a", MINUTE, 3, t(60_000));
        assert!(decision.allowed);
        assert_eq!(decision.reset_at, t(120_000));
    }

    #[test]
    fn never_exceeds_max_entries() {
        let cache = FallbackCache::new(3);
        for i in 0..10 {
            cache.read_and_advance(&format!("ip:{}", i), MINUTE, 5, t(0));
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn evicts_least_recently_touched() {
        let cache = FallbackCache::new(2);
        cache.read_and_advance("a", MINUTE, 5, t(0));
        cache.read_and_advance("b", MINUTE, 5, t(0));
        // Touch "a" so "b" is the oldest.
        cache.read_and_advance("a", MINUTE, 5, t(0));
        cache.read_and_advance("c", MINUTE, 5, t(0));

        assert_eq!(cache.peek("a", MINUTE, 5, t(0)).count, 2);
        assert_eq!(cache.peek("b", MINUTE, 5, t(0)).count, 0);
        assert_eq!(cache.peek("c", MINUTE, 5, t(0)).count, 1);
    }

    #[test]
    fn expired_entries_are_purged_before_live_ones_are_evicted() {
        let cache = FallbackCache::new(2);
        cache.read_and_advance("short", Duration::from_secs(1), 5, t(0));
        cache.read_and_advance("long", MINUTE, 5, t(0));
        // "short" is now the most recent, but its window is over by t(2000).
        cache.read_and_advance("short", Duration::from_secs(1), 5, t(500));

        cache.read_and_advance("new", MINUTE, 5, t(2_000));

        assert_eq!(cache.peek("long", MINUTE, 5, t(2_000)).count, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn zero_limit_tracks_nothing() {
        let cache = FallbackCache::new(10);
        assert!(!cache.read_and_advance("a", MINUTE, 0, t(0)).allowed);
        assert!(cache.is_empty());
    }

    #[test]
    fn address_flood_does_not_evict_exhausted_usage_window() {
        const DAY: Duration = Duration::from_secs(86_400);
        let cache = FallbackCache::new(4);
        for _ in 0..3 {
            assert!(cache.read_and_advance("usage:u1:DOC_GENERATOR", DAY, 3, t(0)).allowed);
        }
        assert!(!cache.read_and_advance("usage:u1:DOC_GENERATOR", DAY, 3, t(0)).allowed);

        for i in 0..4 {
            cache.read_and_advance(&format!("ip:10.0.0.{}", i), MINUTE, 5, t(1_000));
        }

        let again = cache.read_and_advance("usage:u1:DOC_GENERATOR", DAY, 3, t(2_000));
        assert!(!again.allowed);
        assert_eq!(again.count, 3);
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn new_key_is_denied_when_only_live_usage_windows_remain() {
        let cache = FallbackCache::new(2);
        cache.read_and_advance("usage:u1:CHAT", MINUTE, 5, t(0));
        cache.read_and_advance("usage:u2:CHAT", MINUTE, 5, t(0));

        let decision = cache.read_and_advance("ip:10.0.0.1", MINUTE, 5, t(0));

        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.peek("usage:u1:CHAT", MINUTE, 5, t(0)).count, 1);
    }

    #[test]
    fn expired_usage_window_is_reclaimed() {
        let cache = FallbackCache::new(1);
        cache.read_and_advance("usage:u1:CHAT", MINUTE, 5, t(0));

        assert!(cache.read_and_advance("ip:10.0.0.1", MINUTE, 5, t(60_000)).allowed);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn concurrent_threads_admit_exactly_limit() {
        let cache = Arc::new(FallbackCache::new(100));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    (0..25)
                        .filter(|_| cache.read_and_advance("ip:x", MINUTE, 100, t(0)).allowed)
                        .count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
    }
}
