//! Service error types
//!
//! Failures from the HTTP-facing default implementations. Transport and
//! timeout errors are transient; the rest are deterministic and must not
//! be retried.

use thiserror::Error;

/// Service error type
#[derive(Debug, Error)]
pub enum ServiceError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Service returned an error
    #[error("service error from {service}: {message}")]
    ServiceFailed { service: String, message: String },

    /// Invalid response from service
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Timeout waiting for response
    #[error("request timeout")]
    Timeout,

    /// Invalid parameters
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

impl ServiceError {
    /// Whether the failure may clear on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Http(_) | ServiceError::Timeout)
    }
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
