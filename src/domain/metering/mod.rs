//! Metering - bounded counters, quotas, and access denials.

mod errors;
mod quota;
pub mod window;

pub use errors::AccessError;
pub use quota::{QuotaDecision, QuotaPeriod, QuotaPolicy};
pub use window::{CounterDecision, WindowCounter};
