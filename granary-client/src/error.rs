//! Error types for the granary client

use granary_core::signing::SignError;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the broker or event bus
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Server returned an error status code
    #[error("server error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the server
        message: String,
    },

    /// The broker answered the frame with an in-protocol error document
    #[error("broker rejected the request: {0}")]
    Broker(String),

    /// A broker verify key is pinned but the response carries no signature
    #[error("broker response carries no signature")]
    UnsignedResponse,

    /// The response signature does not match the pinned broker key
    #[error("broker response signature does not verify")]
    ResponseVerification,

    /// Failed to serialize a request frame or sign an event
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    /// Event signing failed
    #[error("failed to sign event: {0}")]
    Sign(#[from] SignError),

    /// Failed to parse a response
    #[error("failed to parse response: {0}")]
    ParseError(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Whether the server refused the request as unauthorized
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::ApiError { status: 403, .. })
    }
}
