//! Rate limiting port.
//!
//! Callers ask whether a request from an address, and optionally an
//! authenticated identity, fits in its budget. The answer is always a
//! decision; store outages are absorbed behind this interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{CounterKey, CounterStoreError};
use crate::domain::foundation::{IdentityId, Timestamp};
use crate::domain::metering::AccessError;

/// Port for request rate limiting.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Consumes one request from the caller's budget.
    async fn check(&self, ip: &str, identity: Option<&IdentityId>) -> RateLimitDecision;

    /// Reads the caller's budget without consuming. `None` when the
    /// durable store cannot be read.
    async fn status(&self, ip: &str, identity: Option<&IdentityId>) -> Option<RateLimitDecision>;

    /// Clears a key's window (admin operation).
    async fn reset(&self, key: &RateLimitKey) -> Result<(), CounterStoreError>;
}

/// Key identifying whose budget is consumed.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum RateLimitKey {
    /// Anonymous caller keyed by client address.
    Ip(String),
    /// Authenticated caller.
    User(IdentityId),
}

impl RateLimitKey {
    /// Key for a caller: identity if present, else address.
    pub fn for_caller(ip: &str, identity: Option<&IdentityId>) -> Self {
        match identity {
            Some(id) => RateLimitKey::User(id.clone()),
            None => RateLimitKey::Ip(ip.to_string()),
        }
    }

    /// Counter key in the shared store.
    pub fn counter_key(&self) -> CounterKey {
        match self {
            RateLimitKey::Ip(addr) => CounterKey::Ip(addr.clone()),
            RateLimitKey::User(id) => CounterKey::Identity(id.clone()),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.counter_key())
    }
}

/// Which store produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitPath {
    /// Shared durable store.
    Durable,
    /// Process-local fallback cache with the stricter limit.
    Fallback,
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub key: RateLimitKey,
    pub allowed: bool,
    /// Limit that was applied (the stricter one on the fallback path).
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Timestamp,
    pub path: RateLimitPath,
}

impl RateLimitDecision {
    /// Seconds until the window resets, at least one when denied.
    pub fn retry_after_secs(&self, now: &Timestamp) -> u64 {
        let secs = self.reset_at.secs_until(now);
        if self.allowed {
            secs
        } else {
            secs.max(1)
        }
    }

    /// Converts a denial into `AccessError::RateLimitExceeded`.
    pub fn into_result(self, now: &Timestamp) -> Result<RateLimitDecision, AccessError> {
        if self.allowed {
            return Ok(self);
        }
        Err(AccessError::RateLimitExceeded {
            limit: self.limit,
            retry_after_secs: self.retry_after_secs(now),
            reset_at: self.reset_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(allowed: bool) -> RateLimitDecision {
        RateLimitDecision {
            key: RateLimitKey::Ip("10.0.0.1".to_string()),
            allowed,
            limit: 20,
            remaining: if allowed { 5 } else { 0 },
            reset_at: Timestamp::from_unix_millis(30_000),
            path: RateLimitPath::Durable,
        }
    }

    #[test]
    fn identity_takes_precedence_over_ip() {
        let id = IdentityId::new("u1").unwrap();
        let key = RateLimitKey::for_caller("10.0.0.1", Some(&id));
        assert_eq!(key, RateLimitKey::User(id.clone()));
        assert_eq!(key.counter_key().storage_key(), "user:u1");
    }

    #[test]
    fn anonymous_caller_is_keyed_by_ip() {
        let key = RateLimitKey::for_caller("10.0.0.1", None);
        assert_eq!(key.counter_key().storage_key(), "ip:10.0.0.1");
    }

    #[test]
    fn key_displays_scope_and_identifier() {
        let key = RateLimitKey::Ip("10.0.0.1".to_string());
        assert_eq!(key.to_string(), "ip:10.0.0.1");
    }

    #[test]
    fn allowed_decision_converts_to_ok() {
        let now = Timestamp::from_unix_millis(0);
        assert!(decision(true).into_result(&now).is_ok());
    }

    #[test]
    fn denied_decision_converts_to_rate_limit_error() {
        let now = Timestamp::from_unix_millis(0);
        let err = decision(false).into_result(&now).unwrap_err();
        assert_eq!(
            err,
            AccessError::RateLimitExceeded {
                limit: 20,
                retry_after_secs: 30,
                reset_at: Timestamp::from_unix_millis(30_000),
            }
        );
    }
}
