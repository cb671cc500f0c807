//! PostgreSQL implementation of EntitlementRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::entitlement::{SubscriberEntitlement, SubscriptionTier};
use crate::domain::foundation::{DomainError, ErrorCode, IdentityId, Timestamp};
use crate::ports::EntitlementRepository;

/// PostgreSQL implementation of the EntitlementRepository port.
pub struct PostgresEntitlementRepository {
    pool: PgPool,
}

impl PostgresEntitlementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of an entitlement.
#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    identity_id: String,
    tier: String,
    trial_ends_at: Option<DateTime<Utc>>,
    privileged_override: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntitlementRow> for SubscriberEntitlement {
    type Error = DomainError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let tier: SubscriptionTier = row.tier.parse().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid tier value: {}", e))
        })?;
        let identity_id = IdentityId::new(row.identity_id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid identity_id: {}", e))
        })?;

        Ok(SubscriberEntitlement {
            identity_id,
            tier,
            trial_ends_at: row.trial_ends_at.map(Timestamp::from_datetime),
            privileged_override: row.privileged_override,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

const SELECT_ENTITLEMENT: &str = r#"
    SELECT identity_id, tier, trial_ends_at, privileged_override, created_at, updated_at
    FROM subscriber_entitlements
    WHERE identity_id = $1
"#;

#[async_trait]
impl EntitlementRepository for PostgresEntitlementRepository {
    async fn find(
        &self,
        identity: &IdentityId,
    ) -> Result<Option<SubscriberEntitlement>, DomainError> {
        let row: Option<EntitlementRow> = sqlx::query_as(SELECT_ENTITLEMENT)
            .bind(identity.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database(format!("Failed to fetch entitlement: {}", e)))?;

        row.map(SubscriberEntitlement::try_from).transpose()
    }

    async fn create_trial(
        &self,
        identity: &IdentityId,
        now: Timestamp,
        trial_days: i64,
    ) -> Result<SubscriberEntitlement, DomainError> {
        let trial = SubscriberEntitlement::new_trial(identity.clone(), now, trial_days);

        sqlx::query(
            r#"
            INSERT INTO subscriber_entitlements
                (identity_id, tier, trial_ends_at, privileged_override, created_at, updated_at)
            VALUES ($1, $2, $3, FALSE, $4, $4)
            ON CONFLICT (identity_id) DO NOTHING
            "#,
        )
        .bind(identity.as_str())
        .bind(trial.tier.as_str())
        .bind(trial.trial_ends_at.map(|t| *t.as_datetime()))
        .bind(*now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to create trial: {}", e)))?;

        self.find(identity).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::EntitlementNotFound,
                "Entitlement missing after insert",
            )
            .with_detail("identity_id", identity.as_str())
        })
    }
}
