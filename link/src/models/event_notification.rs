use serde::Serialize;
use serde_json::Value as JsonValue;

use super::channel_set::ChannelSet;

/// An event delivered to a subscriber.
///
/// For [`RealtimeClient::subscribe`](crate::RealtimeClient::subscribe) the
/// payload is the raw JSON value; for
/// [`RealtimeClient::subscribe_as`](crate::RealtimeClient::subscribe_as) it is
/// the payload decoded as the requested type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventNotification<T = JsonValue> {
    /// Every channel the server published this event on (not only the ones
    /// the subscriber asked for)
    pub channels: ChannelSet,

    /// Event payload
    pub payload: T,
}

impl<T> EventNotification<T> {
    /// Returns `true` if the event was published on `channel`.
    pub fn is_on(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }
}
