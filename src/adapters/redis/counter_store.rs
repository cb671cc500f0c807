//! Redis-backed counter store for multi-server deployments.
//!
//! Each key is a hash `{count, reset_at}` (reset in Unix milliseconds).
//! Read-and-advance runs as one Lua script, so Redis executes it atomically
//! and concurrent callers cannot both be admitted past the limit.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use std::time::Duration;

use crate::domain::foundation::Timestamp;
use crate::domain::metering::window::{self, CounterDecision, WindowCounter};
use crate::ports::{CounterKey, CounterStore, CounterStoreError};

const KEY_PREFIX: &str = "meter:";

const READ_AND_ADVANCE: &str = r#"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local count = tonumber(redis.call('HGET', KEYS[1], 'count') or '0')
local reset_at = tonumber(redis.call('HGET', KEYS[1], 'reset_at') or '0')

if now >= reset_at then
  if limit == 0 then
    return {0, 0, now + window}
  end
  reset_at = now + window
  redis.call('HSET', KEYS[1], 'count', 1, 'reset_at', reset_at)
  redis.call('PEXPIRE', KEYS[1], window)
  return {1, 1, reset_at}
end

if count < limit then
  count = redis.call('HINCRBY', KEYS[1], 'count', 1)
  return {1, count, reset_at}
end

return {0, count, reset_at}
"#;

/// Redis counter store.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: MultiplexedConnection,
    script: Script,
}

impl RedisCounterStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            script: Script::new(READ_AND_ADVANCE),
        }
    }

    fn redis_key(key: &CounterKey) -> String {
        format!("{}{}", KEY_PREFIX, key.storage_key())
    }
}

fn unavailable(e: redis::RedisError) -> CounterStoreError {
    CounterStoreError::Unavailable(e.to_string())
}

/// Maps the script's `{allowed, count, reset_at}` reply.
fn script_decision(allowed: i64, count: i64, reset_ms: i64, limit: u32) -> CounterDecision {
    let allowed = allowed == 1;
    let count = u32::try_from(count).unwrap_or(0);
    CounterDecision {
        allowed,
        count,
        limit,
        remaining: if allowed { limit.saturating_sub(count) } else { 0 },
        reset_at: Timestamp::from_unix_millis(reset_ms),
    }
}

fn window_millis(window: Duration) -> i64 {
    i64::try_from(window.as_millis()).unwrap_or(i64::MAX)
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn read_and_advance(
        &self,
        key: &CounterKey,
        window: Duration,
        limit: u32,
        now: Timestamp,
    ) -> Result<CounterDecision, CounterStoreError> {
        let mut conn = self.conn.clone();

        let (allowed, count, reset_ms): (i64, i64, i64) = self
            .script
            .key(Self::redis_key(key))
            .arg(now.as_unix_millis())
            .arg(window_millis(window))
            .arg(limit)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(script_decision(allowed, count, reset_ms, limit))
    }

    async fn peek(
        &self,
        key: &CounterKey,
        window: Duration,
        limit: u32,
        now: Timestamp,
    ) -> Result<CounterDecision, CounterStoreError> {
        let mut conn = self.conn.clone();

        let (count, reset_ms): (Option<i64>, Option<i64>) = conn
            .hget(Self::redis_key(key), &["count", "reset_at"])
            .await
            .map_err(unavailable)?;

        let current = match (count, reset_ms) {
            (Some(count), Some(reset_ms)) => Some(WindowCounter {
                count: u32::try_from(count).unwrap_or(0),
                reset_at: Timestamp::from_unix_millis(reset_ms),
            }),
            _ => None,
        };
        Ok(window::peek(current, window, limit, now))
    }

    async fn reset(&self, key: &CounterKey) -> Result<(), CounterStoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::redis_key(key))
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn sweep_expired(&self, _now: Timestamp) -> Result<u64, CounterStoreError> {
        // Keys carry a TTL equal to their window; Redis expires them itself.
        Ok(0)
    }
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore").finish_non_exhaustive()
    }
}
