//! Error types for the REST proxy.

use horizon_data::{DataError, ProxyError};

/// REST proxy errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RestError {
    /// The request failed before a response was received.
    #[error("HTTP request error: {0}")]
    Request(String),

    /// The request timed out.
    #[error("Request timed out")]
    Timeout,

    /// The server could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server answered with a 4xx or 5xx status.
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        /// The status code.
        status: u16,
        /// The response body, or the status reason when the body is empty.
        message: String,
    },

    /// A URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A configured header is not a valid HTTP header.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// A body could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(String),

    /// The response is valid JSON but not in the expected shape.
    #[error("Invalid response body: {0}")]
    InvalidBody(String),

    /// The model could not be addressed or flattened.
    #[error("Model error: {0}")]
    Model(String),

    /// The configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The worker thread could not be started or has stopped.
    #[error("Worker error: {0}")]
    Worker(String),
}

impl From<reqwest::Error> for RestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_decode() {
            Self::InvalidBody(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<url::ParseError> for RestError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for RestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<DataError> for RestError {
    fn from(err: DataError) -> Self {
        Self::Model(err.to_string())
    }
}

impl From<RestError> for ProxyError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::HttpStatus { status, message } => ProxyError::Status { status, message },
            RestError::Json(msg) | RestError::InvalidBody(msg) => ProxyError::InvalidResponse(msg),
            RestError::Model(msg) | RestError::InvalidUrl(msg) => ProxyError::InvalidRequest(msg),
            other => ProxyError::Transport(other.to_string()),
        }
    }
}

/// A specialized Result type for REST proxy operations.
pub type Result<T> = std::result::Result<T, RestError>;
