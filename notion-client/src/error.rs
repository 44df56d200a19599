//! Error types for the Notion client

use thiserror::Error;

/// Notion client error
#[derive(Debug, Error)]
pub enum NotionError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The API rejected the request
    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// Still rate limited after all retries
    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// Token does not look like an integration token
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Client could not be configured
    #[error("Configuration error: {0}")]
    Config(String),

    /// Response did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NotionError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            NotionError::Api { status, .. } => Some(*status),
            NotionError::RateLimited { .. } => Some(429),
            NotionError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, NotionError>;
