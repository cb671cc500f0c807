//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, the clock abstraction, and error
//! types that form the vocabulary of the metering domain.

mod clock;
mod errors;
mod ids;
mod timestamp;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::IdentityId;
pub use timestamp::Timestamp;
