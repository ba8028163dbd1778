//! Model client error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur talking to a small-model provider
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Provider {0} is not available")]
    Unavailable(String),

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Unauthorized at {provider}; re-authentication required")]
    Unauthorized { provider: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bridge process failed: {0}")]
    Bridge(String),

    #[error("All providers failed; last error: {0}")]
    Exhausted(String),
}

impl ModelError {
    /// Whether the next provider in priority order should be tried
    ///
    /// Unauthorized is not worth a retry at the same provider but still
    /// falls through to the next one; only an exhausted chain is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModelError::Exhausted(_))
    }

    /// Whether the caller should surface a re-authentication prompt
    pub fn needs_reauth(&self) -> bool {
        matches!(self, ModelError::Unauthorized { .. })
    }
}
