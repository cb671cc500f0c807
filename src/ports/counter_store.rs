//! Counter store port.
//!
//! A durable store of fixed-window counters with atomic read-and-advance.
//! Rate-limit keys and usage-quota keys share this contract; only their
//! window length and limit differ.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::domain::entitlement::Feature;
use crate::domain::foundation::{IdentityId, Timestamp};
use crate::domain::metering::CounterDecision;

/// Port for durable bounded counters.
///
/// Implementations must serialize concurrent calls for the same key so that
/// no more than `limit` calls are admitted per window.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Applies one event to `key` in a single atomic step.
    ///
    /// # Errors
    ///
    /// `Unavailable`/`Timeout` when the store cannot be reached. The store
    /// never guesses an answer in that case.
    async fn read_and_advance(
        &self,
        key: &CounterKey,
        window: Duration,
        limit: u32,
        now: Timestamp,
    ) -> Result<CounterDecision, CounterStoreError>;

    /// Reads the current decision without consuming.
    async fn peek(
        &self,
        key: &CounterKey,
        window: Duration,
        limit: u32,
        now: Timestamp,
    ) -> Result<CounterDecision, CounterStoreError>;

    /// Clears one key, restoring its full budget.
    async fn reset(&self, key: &CounterKey) -> Result<(), CounterStoreError>;

    /// Deletes rate-limit records whose window has ended. Usage counters
    /// are kept. Returns the number of records removed.
    async fn sweep_expired(&self, now: Timestamp) -> Result<u64, CounterStoreError>;
}

/// Identifies one counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CounterKey {
    /// Anonymous caller by client address.
    Ip(String),
    /// Authenticated caller.
    Identity(IdentityId),
    /// Per-identity, per-feature usage quota.
    Usage {
        identity: IdentityId,
        feature: Feature,
    },
}

impl CounterKey {
    const USAGE_PREFIX: &'static str = "usage:";

    pub fn ip(addr: impl Into<String>) -> Self {
        CounterKey::Ip(addr.into())
    }

    pub fn identity(id: &IdentityId) -> Self {
        CounterKey::Identity(id.clone())
    }

    pub fn usage(identity: &IdentityId, feature: Feature) -> Self {
        CounterKey::Usage {
            identity: identity.clone(),
            feature,
        }
    }

    /// Returns true for usage-quota keys.
    pub fn is_usage(&self) -> bool {
        matches!(self, CounterKey::Usage { .. })
    }

    /// Returns true if a flat key produced by [`storage_key`](Self::storage_key)
    /// names a usage-quota counter.
    pub fn is_usage_storage_key(key: &str) -> bool {
        key.starts_with(Self::USAGE_PREFIX)
    }

    /// Flat string form: `ip:<addr>`, `user:<id>`, or `usage:<id>:<FEATURE>`.
    pub fn storage_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterKey::Ip(addr) => write!(f, "ip:{}", addr),
            CounterKey::Identity(id) => write!(f, "user:{}", id),
            CounterKey::Usage { identity, feature } => {
                write!(f, "{}{}:{}", Self::USAGE_PREFIX, identity, feature.as_str())
            }
        }
    }
}

/// Errors from the durable counter store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CounterStoreError {
    /// Backend unreachable or the operation failed.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    /// Backend did not answer within the configured timeout.
    #[error("counter store timed out")]
    Timeout,
}
