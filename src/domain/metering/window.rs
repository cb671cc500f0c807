//! Fixed-window bounded counter.
//!
//! The single primitive behind both rate limiting and usage quotas: a
//! counter that admits up to `limit` events and resets once its window ends.
//! Storage backends hold a [`WindowCounter`] per key and apply [`advance`]
//! inside whatever atomic section they provide.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::foundation::Timestamp;

/// Persisted state of one counter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounter {
    /// Events admitted in the current window.
    pub count: u32,
    /// When the current window ends.
    pub reset_at: Timestamp,
}

impl WindowCounter {
    /// Start of the window, given its length.
    pub fn window_start(&self, window: Duration) -> Timestamp {
        let millis = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        Timestamp::from_unix_millis(self.reset_at.as_unix_millis().saturating_sub(millis))
    }

    /// Returns true once `now` has reached the end of the window.
    pub fn is_expired(&self, now: &Timestamp) -> bool {
        !now.is_before(&self.reset_at)
    }
}

/// Outcome of consulting a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDecision {
    pub allowed: bool,
    /// Count after this call (unchanged on denial).
    pub count: u32,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Timestamp,
}

impl CounterDecision {
    /// Seconds the caller should wait before retrying.
    ///
    /// Never less than one for a denial so clients do not spin.
    pub fn retry_after_secs(&self, now: &Timestamp) -> u64 {
        let secs = self.reset_at.secs_until(now);
        if self.allowed {
            secs
        } else {
            secs.max(1)
        }
    }
}

/// Applies one event to `current`.
///
/// Returns the state to persist (`None` means leave storage untouched) and
/// the decision:
///
/// - missing or expired: reset to `count = 1`, window ends at `now + window`
/// - live and `count < limit`: increment
/// - otherwise: deny without mutation
///
/// A zero `limit` denies every event and never creates state.
pub fn advance(
    current: Option<WindowCounter>,
    window: Duration,
    limit: u32,
    now: Timestamp,
) -> (Option<WindowCounter>, CounterDecision) {
    let live = current.filter(|c| !c.is_expired(&now));

    if limit == 0 {
        let reset_at = live.map(|c| c.reset_at).unwrap_or_else(|| now.plus(window));
        return (None, denied(live.map(|c| c.count).unwrap_or(0), limit, reset_at));
    }

    match live {
        None => {
            let next = WindowCounter {
                count: 1,
                reset_at: now.plus(window),
            };
            (Some(next), admitted(next, limit))
        }
        Some(c) if c.count < limit => {
            let next = WindowCounter {
                count: c.count + 1,
                reset_at: c.reset_at,
            };
            (Some(next), admitted(next, limit))
        }
        Some(c) => (None, denied(c.count, limit, c.reset_at)),
    }
}

/// Reads the decision the next event would see, without consuming anything.
///
/// `allowed` reports whether one more event would be admitted.
pub fn peek(
    current: Option<WindowCounter>,
    window: Duration,
    limit: u32,
    now: Timestamp,
) -> CounterDecision {
    match current.filter(|c| !c.is_expired(&now)) {
        None => CounterDecision {
            allowed: limit > 0,
            count: 0,
            limit,
            remaining: limit,
            reset_at: now.plus(window),
        },
        Some(c) => CounterDecision {
            allowed: c.count < limit,
            count: c.count,
            limit,
            remaining: limit.saturating_sub(c.count),
            reset_at: c.reset_at,
        },
    }
}

fn admitted(state: WindowCounter, limit: u32) -> CounterDecision {
    CounterDecision {
        allowed: true,
        count: state.count,
        limit,
        remaining: limit.saturating_sub(state.count),
        reset_at: state.reset_at,
    }
}

fn denied(count: u32, limit: u32, reset_at: Timestamp) -> CounterDecision {
    CounterDecision {
        allowed: false,
        count,
        limit,
        remaining: 0,
        reset_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn t(millis: i64) -> Timestamp {
        Timestamp::from_unix_millis(millis)
    }

    #[test]
    fn first_event_opens_a_window() {
        let (state, decision) = advance(None, MINUTE, 3, t(1_000));

        assert_eq!(
            state,
            Some(WindowCounter {
                count: 1,
                reset_at: t(61_000)
            })
        );
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at, t(61_000));
    }

    #[test]
    fn events_within_window_increment() {
        let current = WindowCounter {
            count: 1,
            reset_at: t(61_000),
        };
        let (state, decision) = advance(Some(current), MINUTE, 3, t(30_000));

        assert_eq!(state.map(|s| s.count), Some(2));
        assert_eq!(decision.reset_at, t(61_000));
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn event_over_limit_is_denied_without_mutation() {
        let current = WindowCounter {
            count: 3,
            reset_at: t(61_000),
        };
        let (state, decision) = advance(Some(current), MINUTE, 3, t(30_000));

        assert_eq!(state, None);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.count, 3);
    }

    #[test]
    fn expired_window_resets_to_one() {
        let current = WindowCounter {
            count: 3,
            reset_at: t(61_000),
        };
        let (state, decision) = advance(Some(current), MINUTE, 3, t(61_000));

        assert_eq!(
            state,
            Some(WindowCounter {
                count: 1,
                reset_at: t(121_000)
            })
        );
        assert!(decision.allowed);
    }

    #[test]
    fn zero_limit_denies_and_creates_nothing() {
        let (state, decision) = advance(None, MINUTE, 0, t(0));

        assert_eq!(state, None);
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn peek_does_not_consume() {
        let current = WindowCounter {
            count: 2,
            reset_at: t(61_000),
        };
        let decision = peek(Some(current), MINUTE, 3, t(1_000));

        assert!(decision.allowed);
        assert_eq!(decision.count, 2);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn peek_on_expired_window_reports_full_budget() {
        let current = WindowCounter {
            count: 3,
            reset_at: t(61_000),
        };
        let decision = peek(Some(current), MINUTE, 3, t(90_000));

        assert_eq!(decision.remaining, 3);
        assert_eq!(decision.reset_at, t(150_000));
    }

    #[test]
    fn retry_after_is_at_least_one_second_when_denied() {
        let decision = CounterDecision {
            allowed: false,
            count: 3,
            limit: 3,
            remaining: 0,
            reset_at: t(1_000),
        };
        assert_eq!(decision.retry_after_secs(&t(1_000)), 1);
        assert_eq!(decision.retry_after_secs(&t(0)), 1);
    }

    #[test]
    fn retry_after_rounds_up() {
        let decision = CounterDecision {
            allowed: false,
            count: 3,
            limit: 3,
            remaining: 0,
            reset_at: t(86_400_000),
        };
        assert_eq!(decision.retry_after_secs(&t(1)), 86_400);
    }

    #[test]
    fn window_start_is_reset_minus_window() {
        let counter = WindowCounter {
            count: 1,
            reset_at: t(61_000),
        };
        assert_eq!(counter.window_start(MINUTE), t(1_000));
    }

    proptest! {
        #[test]
        fn exactly_limit_events_admitted_per_window(limit in 1u32..50, extra in 1u32..20) {
            let now = t(0);
            let mut state = None;
            let mut admitted = 0;

            for _ in 0..(limit + extra) {
                let (next, decision) = advance(state, MINUTE, limit, now);
                if let Some(next) = next {
                    state = Some(next);
                }
                if decision.allowed {
                    admitted += 1;
                }
            }

            prop_assert_eq!(admitted, limit);
        }

        #[test]
        fn next_window_starts_fresh(limit in 1u32..20, window_ms in 1u64..1_000_000) {
            let window = Duration::from_millis(window_ms);
            let mut state = None;
            for _ in 0..=limit {
                let (next, _) = advance(state, window, limit, t(0));
                if next.is_some() {
                    state = next;
                }
            }

            let later = t(window_ms as i64);
            let (next, decision) = advance(state, window, limit, later);

            prop_assert!(decision.allowed);
            prop_assert_eq!(next.map(|s| s.count), Some(1));
            prop_assert_eq!(decision.reset_at, later.plus(window));
        }
    }
}
