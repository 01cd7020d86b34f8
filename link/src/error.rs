//! Error types for realtime-link.

use thiserror::Error;

/// Result type for realtime-link operations
pub type Result<T> = std::result::Result<T, RealtimeError>;

/// Errors that can occur while managing the shared realtime connection.
///
/// Transport-level failures are handled inside the connection supervisor and
/// never reach subscribers; the only error a subscriber stream yields is
/// [`RealtimeError::ServerError`], and it is terminal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RealtimeError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    #[error("Timeout: {0}")]
    TimeoutError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An `error` frame pushed by the server.
    #[error("Server error{}: {}", .code.map(|c| format!(" ({})", c)).unwrap_or_default(), .message)]
    ServerError { message: String, code: Option<i64> },
}

impl RealtimeError {
    /// Message carried by a server error frame, if this is one.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            RealtimeError::ServerError { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        RealtimeError::SerializationError(err.to_string())
    }
}
