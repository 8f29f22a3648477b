//! Quota and rate-limit errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuotaError {
    /// User-retryable throttle; carries the computed retry time.
    #[error("rate limit exceeded: {detail}")]
    RateLimitExceeded {
        detail: String,
        retry_at: DateTime<Utc>,
    },

    /// Plan's project cap reached; user-actionable, never auto-retried.
    #[error("project limit exceeded: {0}")]
    ProjectLimitExceeded(String),

    /// Per-project vector cap reached; user-actionable, never auto-retried.
    #[error("vector capacity exceeded: {0}")]
    VectorCapacityExceeded(String),

    /// Tenant has no active subscription: a data-integrity problem, not a
    /// throttle; surfaced distinctly from a 429-class failure.
    #[error("missing subscription: {0}")]
    MissingSubscription(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl QuotaError {
    /// Stable machine-checkable tag for the API boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            QuotaError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            QuotaError::ProjectLimitExceeded(_) => "project_limit_exceeded",
            QuotaError::VectorCapacityExceeded(_) => "vector_capacity_exceeded",
            QuotaError::MissingSubscription(_) => "missing_subscription",
            QuotaError::Configuration(_) => "configuration",
            QuotaError::Database(_) => "database",
        }
    }
}
