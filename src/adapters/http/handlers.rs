//! HTTP handlers for access checks, quota reads, and payment webhooks.
//!
//! These handlers connect Axum routes to the application layer services.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use super::dto::{AccessGrantedResponse, ErrorResponse, HealthResponse, QuotaView, WebhookResponse};
use super::middleware::RateLimitState;
use crate::application::{AccessGate, HandlePaymentWebhookCommand, HandlePaymentWebhookHandler, UsageQuotaTracker};
use crate::domain::billing::WebhookError;
use crate::domain::entitlement::Feature;
use crate::domain::metering::AccessError;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "X-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state, cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AccessGate>,
    pub quotas: Arc<UsageQuotaTracker>,
    pub webhooks: Arc<HandlePaymentWebhookHandler>,
    pub rate_limit: RateLimitState,
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /access/:feature - Rate limit, entitlement, and quota in one check.
///
/// Consumes one request from the caller's budget and, when granted, one
/// unit of the feature's quota.
pub async fn authorize_feature(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Path(feature): Path<String>,
) -> Result<Json<AccessGrantedResponse>, AccessError> {
    let client_ip = state.rate_limit.client_ip(&headers, connect_info.as_ref());
    let identity = state.rate_limit.identity(&headers);

    let decision = state
        .gate
        .authorize_named(&client_ip, identity.as_ref(), &feature)
        .await?;

    Ok(Json(AccessGrantedResponse::from(decision)))
}

/// GET /quota/:feature - Remaining allowance without consuming.
pub async fn quota_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(feature): Path<String>,
) -> Response {
    let Some(identity) = state.rate_limit.identity(&headers) else {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        return (StatusCode::UNAUTHORIZED, Json(error)).into_response();
    };
    let Ok(feature) = feature.parse::<Feature>() else {
        let error = ErrorResponse::new("UNKNOWN_FEATURE", format!("Unknown feature: {}", feature));
        return (StatusCode::NOT_FOUND, Json(error)).into_response();
    };

    match state.quotas.status(&identity, feature).await {
        Ok(decision) => Json(QuotaView::from(decision)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /webhooks/payment - Payment provider events.
///
/// Responds 200 for new, duplicate, and ignored events alike.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, WebhookError> {
    // A missing header fails verification like a wrong one.
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let cmd = HandlePaymentWebhookCommand {
        payload: body.to_vec(),
        signature: signature.to_string(),
    };
    let outcome = state.webhooks.handle(cmd).await?;

    Ok(Json(WebhookResponse::from(outcome)))
}

/// GET /health - Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
