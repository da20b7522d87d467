//! Error types for pulse-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pulse_engine::DeliveryError;
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Engine assembly error
    #[error("Engine error: {0}")]
    Engine(#[from] pulse_engine::EngineError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures fetching or decoding the historical feed
#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("historical payload is not a JSON array of edits: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Live stream connection errors. Each one ends a connection attempt and
/// triggers a reconnect.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("connect failed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("stream endpoint answered with status {0}")]
    Status(u16),

    #[error("read failed: {0}")]
    Read(#[source] reqwest::Error),

    #[error("no data for {0:?}")]
    Stalled(std::time::Duration),

    #[error("stream closed by server")]
    Closed,
}

/// Outbound notification errors
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Map a reqwest failure onto the engine's delivery error.
pub(crate) fn delivery_error(e: reqwest::Error) -> DeliveryError {
    DeliveryError::Transport(e.to_string())
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
