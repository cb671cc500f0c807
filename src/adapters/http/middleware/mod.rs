//! HTTP middleware for axum.
//!
//! - `rate_limit` - Per-caller request budgets and rate limit headers

pub mod rate_limit;

pub use rate_limit::{
    extract_client_ip, rate_limit_middleware, RateLimitState, IDENTITY_HEADER, UPSTREAM_SECRET_HEADER,
};
