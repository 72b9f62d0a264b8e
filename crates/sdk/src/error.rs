//! Error types for the Dooray SDK.

use crate::types::ResponseHeader;

/// Result type for SDK operations.
pub type DoorayResult<T> = Result<T, DoorayError>;

/// Error types that can occur when using the Dooray SDK.
#[derive(Debug, thiserror::Error)]
pub enum DoorayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Dooray answered with a failure, either through the HTTP status or the
    /// `header.isSuccessful` flag of the response envelope.
    #[error("Dooray API error (status {status}, code {result_code}): {message}")]
    Api {
        status: u16,
        result_code: i64,
        message: String,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl DoorayError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether the remote service rejected the call (as opposed to the call
    /// never completing).
    pub fn is_api_error(&self) -> bool {
        matches!(self, Self::Api { .. })
    }

    /// Create an API error from a status code and response body.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => Self::from_header(status, &envelope.header),
            Err(_) => Self::Api {
                status,
                result_code: i64::from(status),
                message: if body.is_empty() {
                    format!("API call failed with status {}", status)
                } else {
                    body.to_string()
                },
            },
        }
    }

    /// Create an API error from an unsuccessful envelope header.
    pub fn from_header(status: u16, header: &ResponseHeader) -> Self {
        Self::Api {
            status,
            result_code: header.result_code,
            message: header
                .result_message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string()),
        }
    }
}

#[derive(serde::Deserialize)]
struct ErrorEnvelope {
    header: ResponseHeader,
}
