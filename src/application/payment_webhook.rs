//! HandlePaymentWebhookHandler - applies payment provider events to
//! subscriber entitlements exactly once.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::rate_limit::bounded;
use crate::domain::billing::{EntitlementChange, WebhookError, WebhookVerifier};
use crate::domain::entitlement::Feature;
use crate::domain::foundation::{Clock, DomainError};
use crate::ports::{CounterKey, CounterStore, LedgerOutcome, PaymentLedger};

/// Bound on one ledger call unless configured otherwise. Longer than the
/// counter timeout since the apply step is a multi-statement transaction.
const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(2);

/// Command to handle a payment webhook.
#[derive(Debug, Clone)]
pub struct HandlePaymentWebhookCommand {
    /// Raw webhook payload.
    pub payload: Vec<u8>,
    /// Webhook signature header.
    pub signature: String,
}

/// Result of webhook processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event recorded and the entitlement change applied.
    Processed,
    /// Event id was seen before; nothing changed.
    AlreadyProcessed,
    /// Event recorded but carries no entitlement change.
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::AlreadyProcessed => "already_processed",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

/// Handler for payment provider webhooks.
pub struct HandlePaymentWebhookHandler {
    verifier: WebhookVerifier,
    ledger: Arc<dyn PaymentLedger>,
    clock: Arc<dyn Clock>,
    usage_store: Option<Arc<dyn CounterStore>>,
    store_timeout: Duration,
}

impl HandlePaymentWebhookHandler {
    pub fn new(verifier: WebhookVerifier, ledger: Arc<dyn PaymentLedger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            verifier,
            ledger,
            clock,
            usage_store: None,
            store_timeout: DEFAULT_LEDGER_TIMEOUT,
        }
    }

    /// Bounds each ledger and usage store call. A timed-out event is not
    /// recorded, so the provider's retry applies it.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Also clears usage counters in `store` after a change commits.
    ///
    /// Needed when usage counters live outside the ledger's database,
    /// as with the Redis counter backend.
    pub fn with_usage_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.usage_store = Some(store);
        self
    }

    pub async fn handle(&self, cmd: HandlePaymentWebhookCommand) -> Result<WebhookOutcome, WebhookError> {
        // 1. Verify signature before reading anything from the body
        let event = self
            .verifier
            .verify_and_parse(&cmd.payload, &cmd.signature)
            .map_err(|e| {
                tracing::warn!(error = %e, "Rejected payment webhook");
                e
            })?;

        // 2. Cheap duplicate check; apply_once re-checks under its own lock
        let seen = self.within(self.ledger.contains(&event.id)).await?;
        if seen {
            tracing::info!(event_id = %event.id, "Duplicate payment event");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        // 3. Record and apply in one atomic unit
        let change = event.entitlement_change()?;
        let outcome = self
            .within(self.ledger.apply_once(&event, change.as_ref(), self.clock.now()))
            .await
            .map_err(|e| {
                tracing::error!(event_id = %event.id, error = %e, "Failed to apply payment event");
                e
            })?;

        match (outcome, change) {
            (LedgerOutcome::AlreadyProcessed, _) => {
                tracing::info!(event_id = %event.id, "Duplicate payment event");
                Ok(WebhookOutcome::AlreadyProcessed)
            }
            (LedgerOutcome::Applied, Some(change)) => {
                self.reset_external_usage(&change).await;
                tracing::info!(
                    event_id = %event.id,
                    identity = %change.identity_id(),
                    tier = change.resulting_tier().as_str(),
                    "Entitlement updated from payment event"
                );
                Ok(WebhookOutcome::Processed)
            }
            (LedgerOutcome::Applied, None) => {
                tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Payment event ignored");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }
}

impl HandlePaymentWebhookHandler {
    async fn within<T, F>(&self, call: F) -> Result<T, WebhookError>
    where
        F: Future<Output = Result<T, DomainError>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(|e| WebhookError::Database(e.to_string())),
            Err(_) => Err(WebhookError::Database(format!(
                "ledger call timed out after {:?}",
                self.store_timeout
            ))),
        }
    }

    async fn reset_external_usage(&self, change: &EntitlementChange) {
        let Some(store) = &self.usage_store else {
            return;
        };
        for feature in Feature::ALL {
            let key = CounterKey::usage(change.identity_id(), feature);
            if let Err(e) = bounded(self.store_timeout, store.reset(&key)).await {
                tracing::warn!(key = %key, error = %e, "Failed to reset usage counter");
            }
        }
    }
}

impl std::fmt::Debug for HandlePaymentWebhookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlePaymentWebhookHandler")
            .field("verifier", &self.verifier)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}
