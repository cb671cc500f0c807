//! In-memory payment ledger.
//!
//! The ledger lock is held across the event insert and the entitlement and
//! usage writes, which makes them one atomic step within the process.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{InMemoryCounterStore, InMemoryEntitlementRepository};
use crate::domain::billing::{EntitlementChange, PaymentEvent};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{LedgerOutcome, PaymentLedger};

/// In-memory idempotency ledger applying changes to in-memory stores.
#[derive(Debug, Clone)]
pub struct InMemoryPaymentLedger {
    processed: Arc<Mutex<HashMap<String, Timestamp>>>,
    entitlements: InMemoryEntitlementRepository,
    counters: InMemoryCounterStore,
}

impl InMemoryPaymentLedger {
    pub fn new(entitlements: InMemoryEntitlementRepository, counters: InMemoryCounterStore) -> Self {
        Self {
            processed: Arc::new(Mutex::new(HashMap::new())),
            entitlements,
            counters,
        }
    }

    /// Number of recorded events.
    pub async fn len(&self) -> usize {
        self.processed.lock().await.len()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryPaymentLedger {
    async fn contains(&self, event_id: &str) -> Result<bool, DomainError> {
        Ok(self.processed.lock().await.contains_key(event_id))
    }

    async fn apply_once(
        &self,
        event: &PaymentEvent,
        change: Option<&EntitlementChange>,
        now: Timestamp,
    ) -> Result<LedgerOutcome, DomainError> {
        let mut processed = self.processed.lock().await;
        if processed.contains_key(&event.id) {
            return Ok(LedgerOutcome::AlreadyProcessed);
        }

        if let Some(change) = change {
            self.entitlements
                .upsert_tier(change.identity_id(), change.resulting_tier(), now)
                .await?;
            self.counters.clear_usage(change.identity_id()).await;
        }
        processed.insert(event.id.clone(), now);

        Ok(LedgerOutcome::Applied)
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut processed = self.processed.lock().await;
        let before = processed.len();
        processed.retain(|_, at| !at.is_before(&cutoff));
        Ok((before - processed.len()) as u64)
    }
}
