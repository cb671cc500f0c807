//! User-facing access denials.

use http::StatusCode;
use thiserror::Error;

use crate::domain::entitlement::{Feature, SubscriptionTier};
use crate::domain::foundation::Timestamp;

/// Reasons a request is refused by the access layer.
///
/// Counter-store outages never appear here; they are absorbed by the
/// fallback path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// Caller exceeded its request budget for the current window.
    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimitExceeded {
        limit: u32,
        retry_after_secs: u64,
        reset_at: Timestamp,
    },

    /// The caller's plan does not include the feature.
    #[error("Feature {feature} is not included in the {tier} plan")]
    FeatureLocked {
        feature: String,
        tier: SubscriptionTier,
        required_tier: Option<SubscriptionTier>,
    },

    /// The feature is included but this period's allowance is used up.
    #[error("Quota for {feature} exhausted until {}", resets_at.as_datetime())]
    QuotaExceeded {
        feature: Feature,
        limit: u32,
        resets_at: Timestamp,
    },

    /// The entitlement record could not be read.
    #[error("Entitlement unavailable: {0}")]
    EntitlementUnavailable(String),
}

impl AccessError {
    /// Maps the error to an HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AccessError::RateLimitExceeded { .. } | AccessError::QuotaExceeded { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AccessError::FeatureLocked { .. } => StatusCode::FORBIDDEN,
            AccessError::EntitlementUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            AccessError::FeatureLocked { .. } => "FEATURE_LOCKED",
            AccessError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            AccessError::EntitlementUnavailable(_) => "ENTITLEMENT_UNAVAILABLE",
        }
    }

    /// Seconds until the caller may retry, for denials that have one.
    pub fn retry_after_secs(&self, now: &Timestamp) -> Option<u64> {
        match self {
            AccessError::RateLimitExceeded {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            AccessError::QuotaExceeded { resets_at, .. } => Some(resets_at.secs_until(now).max(1)),
            _ => None,
        }
    }
}
