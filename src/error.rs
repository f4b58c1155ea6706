// src/error.rs

//! Unified error handling for rally-scout.

use std::fmt;

use thiserror::Error;

/// Result type alias for rally-scout operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or low-level request failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Network failure or upstream 5xx, exhausted after retries
    #[error("Upstream unavailable for {url}: {message}")]
    TransientUpstream { url: String, message: String },

    /// Upstream returned 429 on every attempt
    #[error("Rate limited by upstream for {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    /// Upstream returned a non-429 error status; not retried
    #[error("Upstream rejected {url} with status {status}")]
    UpstreamRejected { url: String, status: u16 },

    /// Response body did not parse as the expected JSON shape
    #[error("Malformed upstream payload from {url}: {message}")]
    Malformed { url: String, message: String },

    /// History/catalog write failed; in-memory state stays authoritative
    #[error("Persistence failure for {path}: {message}")]
    Persistence { path: String, message: String },

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a transient-upstream error.
    pub fn transient(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::TransientUpstream {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a malformed-payload error.
    pub fn malformed(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Malformed {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a persistence error.
    pub fn persistence(path: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
