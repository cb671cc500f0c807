//! Rate limiting middleware for axum.
//!
//! Consumes one request from the caller's budget via the `RateLimiter`
//! port. Authenticated callers (an `X-Identity-Id` header set by the
//! upstream auth layer) are keyed by identity, everyone else by address.
//!
//! The identity and forwarded-address headers are only read from a trusted
//! upstream: proxy trust must be enabled and, when an upstream secret is
//! configured, the request must carry it in `X-Upstream-Secret`. Otherwise
//! the caller is anonymous and keyed by its socket address.
//!
//! Rate limit status is returned in standard HTTP headers:
//! - `X-RateLimit-Limit`: Maximum requests allowed in the window
//! - `X-RateLimit-Remaining`: Requests remaining in the current window
//! - `X-RateLimit-Reset`: Unix timestamp when the window resets
//! - `Retry-After`: Seconds to wait (only on 429 response)
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get, middleware};
//!
//! let state = RateLimitState::new(limiter, clock);
//!
//! let app = Router::new()
//!     .route("/api/resource", get(handler))
//!     .layer(middleware::from_fn_with_state(state, rate_limit_middleware));
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::domain::foundation::{Clock, IdentityId};
use crate::ports::{RateLimitDecision, RateLimiter};

/// Header carrying the authenticated identity.
pub const IDENTITY_HEADER: &str = "X-Identity-Id";

/// Header carrying the shared upstream secret.
pub const UPSTREAM_SECRET_HEADER: &str = "X-Upstream-Secret";

/// Address used when no client address can be determined.
const UNKNOWN_CLIENT: &str = "unknown";

/// Standard rate limit header names.
pub mod headers {
    use super::HeaderName;

    /// Maximum requests allowed in the window.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Requests remaining in the current window.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
    /// Unix timestamp when the window resets.
    pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
}

/// Rate limiter middleware state.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<dyn RateLimiter>,
    pub clock: Arc<dyn Clock>,
    /// Read identity and client address headers set by the proxy.
    /// Only safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
    /// When set, proxy headers also require this value in
    /// `X-Upstream-Secret`.
    pub upstream_secret: Option<SecretString>,
}

impl RateLimitState {
    pub fn new(limiter: Arc<dyn RateLimiter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter,
            clock,
            trust_proxy_headers: false,
            upstream_secret: None,
        }
    }

    pub fn with_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    pub fn with_upstream_secret(mut self, secret: Option<SecretString>) -> Self {
        self.upstream_secret = secret;
        self
    }

    /// Returns true if proxy-set headers on this request may be believed.
    pub fn is_trusted_upstream(&self, headers: &HeaderMap) -> bool {
        if !self.trust_proxy_headers {
            return false;
        }
        let Some(expected) = &self.upstream_secret else {
            return true;
        };
        headers
            .get(UPSTREAM_SECRET_HEADER)
            .map(|presented| {
                bool::from(presented.as_bytes().ct_eq(expected.expose_secret().as_bytes()))
            })
            .unwrap_or(false)
    }

    /// Address that keys anonymous budgets for this request.
    pub fn client_ip(&self, headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> String {
        extract_client_ip(headers, connect_info, self.is_trusted_upstream(headers))
    }

    /// Identity asserted by a trusted upstream, if any.
    pub fn identity(&self, headers: &HeaderMap) -> Option<IdentityId> {
        if !self.is_trusted_upstream(headers) {
            if headers.contains_key(IDENTITY_HEADER) {
                tracing::debug!("Ignoring identity header from untrusted caller");
            }
            return None;
        }
        extract_identity(headers)
    }
}

/// Rate limiting middleware.
///
/// Returns 429 Too Many Requests when the caller's budget is spent, and
/// adds rate limit headers to every response it lets through.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = state.client_ip(request.headers(), connect_info.as_ref());
    let identity = state.identity(request.headers());

    let decision = state.limiter.check(&client_ip, identity.as_ref()).await;
    let limit = decision.limit;
    let now = state.clock.now();

    let decision = match decision.into_result(&now) {
        Ok(decision) => decision,
        Err(denied) => {
            tracing::debug!(client_ip = %client_ip, "Request rate limited");
            let mut response = denied.into_response();
            let headers = response.headers_mut();
            headers.insert(headers::X_RATELIMIT_LIMIT.clone(), HeaderValue::from(limit));
            headers.insert(headers::X_RATELIMIT_REMAINING.clone(), HeaderValue::from(0u32));
            return response;
        }
    };

    let mut response = next.run(request).await;
    add_rate_limit_headers(&mut response, &decision);
    response
}

/// Extract client IP, checking forwarded headers first when trusted.
///
/// Order of precedence:
/// 1. X-Forwarded-For header (first IP in list)
/// 2. X-Real-IP header
/// 3. ConnectInfo socket address
pub fn extract_client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_proxy_headers: bool,
) -> String {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(headers) {
            return ip;
        }
    }

    connect_info
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    // Check X-Forwarded-For first (for reverse proxy setups)
    if let Some(forwarded) = headers.get("X-Forwarded-For").and_then(|h| h.to_str().ok()) {
        // Take the first IP (client IP, before any proxies)
        if let Some(first_ip) = forwarded.split(',').next().map(str::trim) {
            if !first_ip.is_empty() {
                return Some(first_ip.to_string());
            }
        }
    }

    headers
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Identity header value, if any. Callers must check the upstream is
/// trusted first; see [`RateLimitState::identity`].
pub fn extract_identity(headers: &HeaderMap) -> Option<IdentityId> {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| IdentityId::new(v.trim()).ok())
}

/// Add rate limit headers to a response.
fn add_rate_limit_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    headers.insert(headers::X_RATELIMIT_LIMIT.clone(), HeaderValue::from(decision.limit));
    headers.insert(headers::X_RATELIMIT_REMAINING.clone(), HeaderValue::from(decision.remaining));
    headers.insert(
        headers::X_RATELIMIT_RESET.clone(),
        HeaderValue::from(decision.reset_at.as_unix_secs()),
    );
}
