use serde::{Deserialize, Serialize};

use crate::error::RealtimeError;

/// Payload of an `error` frame pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Human-readable error message
    pub message: String,

    /// Optional numeric error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

impl From<ErrorInfo> for RealtimeError {
    fn from(info: ErrorInfo) -> Self {
        RealtimeError::ServerError {
            message: info.message,
            code: info.code,
        }
    }
}
