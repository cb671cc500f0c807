//! Conversion of access and webhook errors into HTTP responses.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::dto::ErrorResponse;
use crate::domain::billing::WebhookError;
use crate::domain::foundation::Timestamp;
use crate::domain::metering::AccessError;

impl IntoResponse for AccessError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs(&Timestamp::now());

        let mut body = ErrorResponse::new(self.code(), self.to_string());
        match &self {
            AccessError::RateLimitExceeded { limit, reset_at, .. } => {
                body = body.with_details(json!({
                    "limit": limit,
                    "remaining": 0,
                    "reset_at": reset_at.as_unix_secs(),
                }));
            }
            AccessError::FeatureLocked {
                feature,
                tier,
                required_tier,
            } => {
                body = body.with_details(json!({
                    "feature": feature,
                    "tier": tier.as_str(),
                    "required_tier": required_tier.map(|t| t.as_str()),
                }));
            }
            AccessError::QuotaExceeded {
                feature,
                limit,
                resets_at,
            } => {
                body = body.with_details(json!({
                    "feature": feature.as_str(),
                    "limit": limit,
                    "remaining": 0,
                    "resets_at": resets_at.as_unix_secs(),
                }));
            }
            AccessError::EntitlementUnavailable(_) => {
                // Store details stay in the logs.
                body.error = "Entitlement service unavailable".to_string();
            }
        }
        if let Some(secs) = retry_after {
            body = body.with_retry_after(secs);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(secs));
        }
        response
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = match &self {
            WebhookError::InvalidSignature => "INVALID_SIGNATURE",
            WebhookError::ParseError(_) | WebhookError::MissingField(_) => "INVALID_PAYLOAD",
            WebhookError::Database(_) => "INTERNAL_ERROR",
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "Webhook processing failed".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
