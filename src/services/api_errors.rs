//! Data API Error Classification
//!
//! Turns raw HTTP/transport failures from the Polymarket data API into a
//! structured error that the retry policy can classify.

use serde::Deserialize;
use thiserror::Error;

/// Structured data API error types
#[derive(Debug, Clone, Error)]
pub enum DataApiError {
    /// Upstream answered with a non-success status
    #[error("data API error {status}: {body}")]
    Http { status: u16, body: String },
    /// Network/connection error (timeout, DNS, reset) - no response status
    #[error("network error: {0}")]
    Network(String),
    /// Response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),
    /// The run was cancelled while this request was pending
    #[error("request cancelled")]
    Cancelled,
}

/// Data API error body format
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl DataApiError {
    /// Build an error from a non-success response
    pub fn from_response(status: u16, body: &str) -> Self {
        let body = match serde_json::from_str::<ErrorResponse>(body) {
            Ok(parsed) => parsed
                .error
                .or(parsed.message)
                .unwrap_or_else(|| body.to_string()),
            Err(_) => body.to_string(),
        };
        DataApiError::Http { status, body }
    }

    /// Parse a network/reqwest error
    pub fn from_network_error(err: &reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return DataApiError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            };
        }
        if err.is_decode() {
            DataApiError::Decode(err.to_string())
        } else if err.is_timeout() {
            DataApiError::Network("request timed out".to_string())
        } else if err.is_connect() {
            DataApiError::Network("connection failed".to_string())
        } else {
            DataApiError::Network(err.to_string())
        }
    }

    /// HTTP status of the failed response, if there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            DataApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error is retryable with exponential backoff.
    ///
    /// No response status, 429 and 5xx are transient. Other statuses fail
    /// immediately, as do decode failures and cancellation.
    pub fn is_retryable(&self) -> bool {
        match self {
            DataApiError::Network(_) => true,
            DataApiError::Http { status, .. } => *status == 429 || *status >= 500,
            DataApiError::Decode(_) | DataApiError::Cancelled => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DataApiError::Cancelled)
    }
}
