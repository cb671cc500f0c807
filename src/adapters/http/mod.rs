//! HTTP adapters - REST surface for access checks and payment webhooks.

pub mod dto;
mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

// Re-export key types for convenience
pub use handlers::AppState;
pub use middleware::{rate_limit_middleware, RateLimitState};
pub use routes::app_router;
