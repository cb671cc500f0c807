//! PostgreSQL implementation of CounterStore.
//!
//! Rate-limit keys live in `rate_limits(key, count, reset_at)`; usage keys
//! in `usage_counters(identity_id, feature, period_start, count)`. Each
//! read-and-advance runs in one transaction holding a row lock, so
//! concurrent callers for the same key serialize.
//!
//! The seed insert takes the row lock itself (`DO UPDATE` on conflict), so a
//! sweep or reset cannot delete the row between seeding and locking. The
//! write-back is an upsert for the same reason.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use std::time::Duration;

use crate::domain::foundation::Timestamp;
use crate::domain::metering::window::{self, CounterDecision, WindowCounter};
use crate::ports::{CounterKey, CounterStore, CounterStoreError};

/// PostgreSQL counter store.
pub struct PostgresCounterStore {
    pool: PgPool,
}

impl PostgresCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RateRow {
    count: i32,
    reset_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    count: i32,
    period_start: DateTime<Utc>,
}

fn unavailable(e: sqlx::Error) -> CounterStoreError {
    CounterStoreError::Unavailable(e.to_string())
}

impl RateRow {
    fn into_counter(self) -> WindowCounter {
        WindowCounter {
            count: to_count(self.count),
            reset_at: Timestamp::from_datetime(self.reset_at),
        }
    }
}

impl UsageRow {
    /// Usage rows store the period start; the window end is derived.
    fn into_counter(self, window: Duration) -> WindowCounter {
        WindowCounter {
            count: to_count(self.count),
            reset_at: Timestamp::from_datetime(self.period_start).plus(window),
        }
    }
}

fn to_count(raw: i32) -> u32 {
    u32::try_from(raw).unwrap_or(0)
}

fn to_db_count(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

/// Reads a key's state; `lock` adds `FOR UPDATE`.
async fn load(
    conn: &mut PgConnection,
    key: &CounterKey,
    window: Duration,
    lock: bool,
) -> Result<Option<WindowCounter>, CounterStoreError> {
    let suffix = if lock { " FOR UPDATE" } else { "" };
    match key {
        CounterKey::Usage { identity, feature } => {
            let sql = format!(
                "SELECT count, period_start FROM usage_counters \
                 WHERE identity_id = $1 AND feature = $2{}",
                suffix
            );
            let row: Option<UsageRow> = sqlx::query_as(&sql)
                .bind(identity.as_str())
                .bind(feature.as_str())
                .fetch_optional(&mut *conn)
                .await
                .map_err(unavailable)?;
            Ok(row.map(|r| r.into_counter(window)))
        }
        rate_key => {
            let sql = format!(
                "SELECT count, reset_at FROM rate_limits WHERE key = $1{}",
                suffix
            );
            let row: Option<RateRow> = sqlx::query_as(&sql)
                .bind(rate_key.storage_key())
                .fetch_optional(&mut *conn)
                .await
                .map_err(unavailable)?;
            Ok(row.map(RateRow::into_counter))
        }
    }
}

/// Creates an already-expired row if none exists, and locks the row either
/// way. The no-op `DO UPDATE` is what takes the lock on an existing row.
async fn seed(
    conn: &mut PgConnection,
    key: &CounterKey,
    window: Duration,
    now: Timestamp,
) -> Result<(), CounterStoreError> {
    let expired = WindowCounter {
        count: 0,
        reset_at: now,
    };
    match key {
        CounterKey::Usage { identity, feature } => {
            sqlx::query(
                r#"
                INSERT INTO usage_counters (identity_id, feature, period_start, count)
                VALUES ($1, $2, $3, 0)
                ON CONFLICT (identity_id, feature)
                DO UPDATE SET count = usage_counters.count
                "#,
            )
            .bind(identity.as_str())
            .bind(feature.as_str())
            .bind(*expired.window_start(window).as_datetime())
            .execute(&mut *conn)
            .await
            .map_err(unavailable)?;
        }
        rate_key => {
            sqlx::query(
                r#"
                INSERT INTO rate_limits (key, count, reset_at)
                VALUES ($1, 0, $2)
                ON CONFLICT (key)
                DO UPDATE SET count = rate_limits.count
                "#,
            )
            .bind(rate_key.storage_key())
            .bind(*now.as_datetime())
            .execute(&mut *conn)
            .await
            .map_err(unavailable)?;
        }
    }
    Ok(())
}

async fn store(
    conn: &mut PgConnection,
    key: &CounterKey,
    window: Duration,
    counter: WindowCounter,
) -> Result<(), CounterStoreError> {
    match key {
        CounterKey::Usage { identity, feature } => {
            sqlx::query(
                r#"
                INSERT INTO usage_counters (identity_id, feature, count, period_start)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (identity_id, feature)
                DO UPDATE SET count = EXCLUDED.count, period_start = EXCLUDED.period_start
                "#,
            )
            .bind(identity.as_str())
            .bind(feature.as_str())
            .bind(to_db_count(counter.count))
            .bind(*counter.window_start(window).as_datetime())
            .execute(&mut *conn)
            .await
            .map_err(unavailable)?;
        }
        rate_key => {
            sqlx::query(
                r#"
                INSERT INTO rate_limits (key, count, reset_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (key)
                DO UPDATE SET count = EXCLUDED.count, reset_at = EXCLUDED.reset_at
                "#,
            )
            .bind(rate_key.storage_key())
            .bind(to_db_count(counter.count))
            .bind(*counter.reset_at.as_datetime())
            .execute(&mut *conn)
            .await
            .map_err(unavailable)?;
        }
    }
    Ok(())
}

#[async_trait]
impl CounterStore for PostgresCounterStore {
    async fn read_and_advance(
        &self,
        key: &CounterKey,
        window: Duration,
        limit: u32,
        now: Timestamp,
    ) -> Result<CounterDecision, CounterStoreError> {
        if limit == 0 {
            let mut conn = self.pool.acquire().await.map_err(unavailable)?;
            let current = load(&mut conn, key, window, false).await?;
            return Ok(window::advance(current, window, limit, now).1);
        }

        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        seed(&mut tx, key, window, now).await?;
        let current = load(&mut tx, key, window, true).await?;
        let (next, decision) = window::advance(current, window, limit, now);
        if let Some(next) = next {
            store(&mut tx, key, window, next).await?;
        }

        tx.commit().await.map_err(unavailable)?;
        Ok(decision)
    }

    async fn peek(
        &self,
        key: &CounterKey,
        window: Duration,
        limit: u32,
        now: Timestamp,
    ) -> Result<CounterDecision, CounterStoreError> {
        let mut conn = self.pool.acquire().await.map_err(unavailable)?;
        let current = load(&mut conn, key, window, false).await?;
        Ok(window::peek(current, window, limit, now))
    }

    async fn reset(&self, key: &CounterKey) -> Result<(), CounterStoreError> {
        match key {
            CounterKey::Usage { identity, feature } => {
                sqlx::query("DELETE FROM usage_counters WHERE identity_id = $1 AND feature = $2")
                    .bind(identity.as_str())
                    .bind(feature.as_str())
                    .execute(&self.pool)
                    .await
                    .map_err(unavailable)?;
            }
            rate_key => {
                sqlx::query("DELETE FROM rate_limits WHERE key = $1")
                    .bind(rate_key.storage_key())
                    .execute(&self.pool)
                    .await
                    .map_err(unavailable)?;
            }
        }
        Ok(())
    }

    async fn sweep_expired(&self, now: Timestamp) -> Result<u64, CounterStoreError> {
        let result = sqlx::query("DELETE FROM rate_limits WHERE reset_at <= $1")
            .bind(*now.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected())
    }
}

impl std::fmt::Debug for PostgresCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresCounterStore").finish_non_exhaustive()
    }
}
