//! Data Transfer Objects for the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::application::{GateDecision, WebhookOutcome};
use crate::domain::metering::QuotaDecision;

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Response for an authorized feature request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrantedResponse {
    pub feature: String,
    pub tier: String,
    pub quota: QuotaView,
}

impl From<GateDecision> for AccessGrantedResponse {
    fn from(decision: GateDecision) -> Self {
        Self {
            feature: decision.quota.feature.as_str().to_string(),
            tier: decision.tier.as_str().to_string(),
            quota: QuotaView::from(decision.quota),
        }
    }
}

/// Remaining allowance for one feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaView {
    pub feature: String,
    pub metered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
    /// Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<u64>,
}

impl From<QuotaDecision> for QuotaView {
    fn from(decision: QuotaDecision) -> Self {
        let metered = !decision.is_unmetered();
        Self {
            feature: decision.feature.as_str().to_string(),
            metered,
            limit: decision.limit,
            remaining: metered.then_some(decision.remaining),
            resets_at: decision.resets_at.map(|t| t.as_unix_secs()),
        }
    }
}

/// Webhook acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
}

impl From<WebhookOutcome> for WebhookResponse {
    fn from(outcome: WebhookOutcome) -> Self {
        Self {
            status: outcome.as_str().to_string(),
        }
    }
}

/// Liveness check body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            retry_after_secs: None,
            details: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entitlement::Feature;
    use crate::domain::foundation::Timestamp;

    #[test]
    fn unmetered_quota_omits_counts() {
        let view = QuotaView::from(QuotaDecision::unmetered(Feature::Export));
        let json = serde_json::to_value(&view).unwrap();

        assert_eq!(json["metered"], false);
        assert!(json.get("remaining").is_none());
    }

    #[test]
    fn metered_quota_reports_reset_in_seconds() {
        let view = QuotaView::from(QuotaDecision {
            feature: Feature::Chat,
            allowed: true,
            limit: Some(50),
            remaining: 49,
            resets_at: Some(Timestamp::from_unix_millis(86_400_000)),
        });

        assert_eq!(view.remaining, Some(49));
        assert_eq!(view.resets_at, Some(86_400));
    }

    #[test]
    fn error_response_skips_empty_fields() {
        let json = serde_json::to_value(ErrorResponse::new("FEATURE_LOCKED", "locked")).unwrap();
        assert!(json.get("retry_after_secs").is_none());
        assert!(json.get("details").is_none());
    }
}
