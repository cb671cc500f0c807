//! Counter store configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Durable backend holding rate-limit and usage counters.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Redis,
}

/// Counter store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Per-call timeout before falling back to the in-process cache
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Per-call timeout for entitlement writes and the payment ledger
    #[serde(default = "default_ledger_timeout_ms")]
    pub ledger_timeout_ms: u64,

    /// Interval between sweeps of expired rate-limit windows
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_ms == 0 || self.timeout_ms > 5_000 {
            return Err(ValidationError::InvalidStoreTimeout);
        }
        if !(1..=30_000).contains(&self.ledger_timeout_ms) {
            return Err(ValidationError::InvalidLedgerTimeout);
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            timeout_ms: default_timeout_ms(),
            ledger_timeout_ms: default_ledger_timeout_ms(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    250
}

fn default_ledger_timeout_ms() -> u64 {
    2_000
}

fn default_sweep_interval() -> u64 {
    300
}
