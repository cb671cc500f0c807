//! Axum router configuration.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::{authorize_feature, health, payment_webhook, quota_status, AppState};
use super::middleware::rate_limit_middleware;

/// Create the complete router.
///
/// # Routes
///
/// - `POST /access/:feature` - Authorize a feature use (rate limit, plan, quota)
/// - `GET /quota/:feature` - Remaining allowance (rate limited)
/// - `POST /webhooks/payment` - Payment provider events (signature verified)
/// - `GET /health` - Liveness check
///
/// The access route applies the rate limit inside the gate, so it is not
/// wrapped in the middleware as well.
pub fn app_router(state: AppState) -> Router {
    let limited = Router::new()
        .route("/quota/:feature", get(quota_status))
        .route_layer(middleware::from_fn_with_state(
            state.rate_limit.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/access/:feature", post(authorize_feature))
        .route("/webhooks/payment", post(payment_webhook))
        .route("/health", get(health))
        .merge(limited)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
