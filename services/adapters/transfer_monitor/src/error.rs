//! Error types for the transfer monitor

use thiserror::Error;

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Failure talking to the transfers API
#[derive(Debug, Error)]
pub enum ApiError {
    /// API key rejected (HTTP 401)
    #[error("Authentication failed (401 Unauthorized), check the API key")]
    Authentication,

    /// Request throttled upstream (HTTP 403 with a rate-limit body)
    #[error("Rate limit exceeded (403 Forbidden/Throttled)")]
    RateLimited {
        /// Truncated response body
        body: String,
    },

    /// Access denied for another reason (HTTP 403)
    #[error("Access forbidden (403 Forbidden): {body}")]
    Forbidden {
        /// Truncated response body
        body: String,
    },

    /// Any other non-success status
    #[error("HTTP error {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// Connection, timeout or TLS failure
    #[error("Connection error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Successful status but the body is not JSON
    #[error("Failed to decode JSON response (status {status}): {message}")]
    Decode {
        /// HTTP status code
        status: u16,
        /// Decoder error message
        message: String,
    },
}

impl ApiError {
    /// HTTP status associated with the error, when there was a response
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Authentication => Some(401),
            ApiError::RateLimited { .. } | ApiError::Forbidden { .. } => Some(403),
            ApiError::Http { status, .. } | ApiError::Decode { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// Main error type for monitor operations
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream API failure
    #[error(transparent)]
    Api(#[from] ApiError),
}
