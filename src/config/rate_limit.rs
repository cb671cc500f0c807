//! Rate limit configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::application::{RateLimitPolicy, WindowLimit};

const MIN_DURABLE_LIMIT: u32 = 2;

/// Request budgets for anonymous and authenticated callers.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_anonymous_limit")]
    pub anonymous_limit: u32,

    #[serde(default = "default_window_ms")]
    pub anonymous_window_ms: u64,

    #[serde(default = "default_authenticated_limit")]
    pub authenticated_limit: u32,

    #[serde(default = "default_window_ms")]
    pub authenticated_window_ms: u64,

    /// Fallback-path limit as a percentage of the durable limit
    #[serde(default = "default_fallback_ratio")]
    pub fallback_ratio_percent: u32,

    /// Capacity of the in-process fallback cache
    #[serde(default = "default_fallback_max_entries")]
    pub fallback_max_entries: usize,
}

impl RateLimitConfig {
    /// Builds the service policy; `store_timeout` comes from the store section.
    pub fn policy(&self, store_timeout: Duration) -> RateLimitPolicy {
        RateLimitPolicy {
            anonymous: WindowLimit::new(
                self.anonymous_limit,
                Duration::from_millis(self.anonymous_window_ms),
            ),
            authenticated: WindowLimit::new(
                self.authenticated_limit,
                Duration::from_millis(self.authenticated_window_ms),
            ),
            fallback_ratio_percent: self.fallback_ratio_percent,
            store_timeout,
        }
    }

    /// Validate rate limit configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        // The fallback limit floors at one, so a limit of one cannot degrade.
        if self.anonymous_limit < MIN_DURABLE_LIMIT {
            return Err(ValidationError::RateLimitTooLow("anonymous"));
        }
        if self.authenticated_limit < MIN_DURABLE_LIMIT {
            return Err(ValidationError::RateLimitTooLow("authenticated"));
        }
        if self.anonymous_window_ms == 0 {
            return Err(ValidationError::ZeroWindow("anonymous"));
        }
        if self.authenticated_window_ms == 0 {
            return Err(ValidationError::ZeroWindow("authenticated"));
        }
        // 100% would make the fallback as lenient as the durable path.
        if self.fallback_ratio_percent == 0 || self.fallback_ratio_percent >= 100 {
            return Err(ValidationError::InvalidFallbackRatio);
        }
        if self.fallback_max_entries == 0 {
            return Err(ValidationError::InvalidFallbackCapacity);
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            anonymous_limit: default_anonymous_limit(),
            anonymous_window_ms: default_window_ms(),
            authenticated_limit: default_authenticated_limit(),
            authenticated_window_ms: default_window_ms(),
            fallback_ratio_percent: default_fallback_ratio(),
            fallback_max_entries: default_fallback_max_entries(),
        }
    }
}

fn default_anonymous_limit() -> u32 {
    20
}

fn default_authenticated_limit() -> u32 {
    100
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_fallback_ratio() -> u32 {
    50
}

fn default_fallback_max_entries() -> usize {
    10_000
}
