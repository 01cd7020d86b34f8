use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::channel_set::ChannelSet;
use super::error_info::ErrorInfo;

/// Frames sent from the server on the realtime connection.
///
/// Wire shape: `{ "type": "error" | "event", "data": <payload> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Server-side error; terminal for every active subscriber.
    Error(ErrorInfo),

    /// Event published on one or more channels.
    Event(EventFrame),
}

/// Payload of an `event` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Channels this event was published on
    pub channels: ChannelSet,

    /// Raw event payload, decoded lazily by each subscriber
    #[serde(default)]
    pub payload: JsonValue,
}

impl InboundFrame {
    /// Frame type tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundFrame::Error(_) => "error",
            InboundFrame::Event(_) => "event",
        }
    }
}
