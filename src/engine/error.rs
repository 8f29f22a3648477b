//! Document-engine client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to {context}: HTTP {status}")]
    Status {
        context: String,
        status: u16,
        /// Response body, truncated for diagnostics.
        detail: String,
    },

    #[error("invalid engine response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Stable machine-checkable tag for the API boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Transport(_) => "transport",
            EngineError::Status { .. } => "status",
            EngineError::InvalidResponse(_) => "invalid_response",
            EngineError::Configuration(_) => "configuration",
        }
    }
}
