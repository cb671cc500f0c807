//! Payment ledger port for idempotent webhook processing.
//!
//! Records which provider events have been applied and applies each
//! event's entitlement change in the same atomic unit.

use async_trait::async_trait;

use crate::domain::billing::{EntitlementChange, PaymentEvent};
use crate::domain::foundation::{DomainError, Timestamp};

/// Idempotency ledger for payment events.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Returns true if the event id has already been recorded.
    async fn contains(&self, event_id: &str) -> Result<bool, DomainError>;

    /// Records `event` and applies `change` atomically.
    ///
    /// If the event id is already recorded, nothing is changed and
    /// `AlreadyProcessed` is returned. A change sets the tier and clears
    /// the identity's usage counters.
    async fn apply_once(
        &self,
        event: &PaymentEvent,
        change: Option<&EntitlementChange>,
        now: Timestamp,
    ) -> Result<LedgerOutcome, DomainError>;

    /// Deletes ledger rows processed before `cutoff`. Returns rows removed.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}

/// Result of `apply_once`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// Event recorded and its change applied.
    Applied,
    /// Event was already recorded; nothing changed.
    AlreadyProcessed,
}
