//! PostgreSQL implementation of PaymentLedger.
//!
//! The ledger insert, tier upsert, and usage reset share one transaction.
//! A duplicate event id inserts nothing, and the transaction then changes
//! nothing else.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::{EntitlementChange, PaymentEvent};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{LedgerOutcome, PaymentLedger};

/// PostgreSQL idempotency ledger.
pub struct PostgresPaymentLedger {
    pool: PgPool,
}

impl PostgresPaymentLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(context: &str) -> impl FnOnce(sqlx::Error) -> DomainError + '_ {
    move |e| DomainError::database(format!("{}: {}", context, e))
}

#[async_trait]
impl PaymentLedger for PostgresPaymentLedger {
    async fn contains(&self, event_id: &str) -> Result<bool, DomainError> {
        let found: Option<(String,)> = sqlx::query_as(
            "SELECT external_event_id FROM processed_payment_events WHERE external_event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to check payment ledger"))?;

        Ok(found.is_some())
    }

    async fn apply_once(
        &self,
        event: &PaymentEvent,
        change: Option<&EntitlementChange>,
        now: Timestamp,
    ) -> Result<LedgerOutcome, DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO processed_payment_events (external_event_id, event_type, processed_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (external_event_id) DO NOTHING
            "#,
        )
        .bind(&event.id)
        .bind(&event.event_type)
        .bind(*now.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to record payment event"))?;

        if inserted.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(db_err("Failed to roll back transaction"))?;
            return Ok(LedgerOutcome::AlreadyProcessed);
        }

        if let Some(change) = change {
            sqlx::query(
                r#"
                INSERT INTO subscriber_entitlements
                    (identity_id, tier, trial_ends_at, privileged_override, created_at, updated_at)
                VALUES ($1, $2, NULL, FALSE, $3, $3)
                ON CONFLICT (identity_id)
                DO UPDATE SET tier = EXCLUDED.tier, updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(change.identity_id().as_str())
            .bind(change.resulting_tier().as_str())
            .bind(*now.as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(db_err("Failed to upsert entitlement"))?;

            sqlx::query("DELETE FROM usage_counters WHERE identity_id = $1")
                .bind(change.identity_id().as_str())
                .execute(&mut *tx)
                .await
                .map_err(db_err("Failed to reset usage counters"))?;
        }

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transaction"))?;

        Ok(LedgerOutcome::Applied)
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM processed_payment_events WHERE processed_at < $1")
            .bind(*cutoff.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_err("Failed to prune payment ledger"))?;

        Ok(result.rows_affected())
    }
}
