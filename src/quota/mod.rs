//! Quota enforcement: token-bucket rate limiting and capacity/usage
//! accounting. Everything here runs before external I/O, so a rejection
//! never needs compensation.

mod accounting;
mod error;
mod rate_limit;

pub use accounting::{
    decrement_vector_usage, ensure_project_capacity, ensure_vector_capacity, get_or_create_usage,
    increment_usage,
};
pub use error::QuotaError;
pub use rate_limit::{RateLimitDecision, apply_plan_limits, consume, consume_at};
