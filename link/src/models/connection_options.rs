use serde::{Deserialize, Serialize};

use super::reconnect_backoff::ReconnectBackoff;

/// What the receive loop does with a frame that cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedFramePolicy {
    /// Log a warning and keep reading from the same connection.
    #[default]
    Skip,
    /// Treat the frame as an unplanned close: drop the connection and
    /// reconnect under the backoff schedule.
    Reconnect,
}

/// Connection-level options for the shared realtime connection.
///
/// These options control:
/// - Automatic reconnection after an unplanned close
/// - The backoff schedule between reconnect attempts
/// - Handling of undecodable frames
/// - Capacity of the broadcast buffer shared by all subscribers
///
/// # Example
///
/// ```rust
/// use realtime_link::{ConnectionOptions, MalformedFramePolicy};
///
/// let options = ConnectionOptions::default()
///     .with_auto_reconnect(true)
///     .with_max_reconnect_attempts(Some(50))
///     .with_malformed_frames(MalformedFramePolicy::Reconnect);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Enable automatic reconnection on connection loss
    /// Default: true
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Maximum number of consecutive reconnection attempts before giving up
    /// Default: None (infinite retries)
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,

    /// Delay schedule between reconnect attempts
    /// Default: 1s / 5s / 10s / 60s stepped at attempts 0 / 5 / 15 / 100
    #[serde(default)]
    pub backoff: ReconnectBackoff,

    /// Handling of frames that fail to decode
    /// Default: Skip
    #[serde(default)]
    pub malformed_frames: MalformedFramePolicy,

    /// Number of frames buffered for slow subscribers before they start
    /// lagging (and miss frames).
    /// Default: 1024
    #[serde(default = "default_event_buffer_capacity")]
    pub event_buffer_capacity: usize,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_event_buffer_capacity() -> usize {
    1024
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            max_reconnect_attempts: None,
            backoff: ReconnectBackoff::default(),
            malformed_frames: MalformedFramePolicy::default(),
            event_buffer_capacity: default_event_buffer_capacity(),
        }
    }
}

impl ConnectionOptions {
    /// Create new connection options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to automatically reconnect on connection loss
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the maximum number of consecutive reconnection attempts
    /// Pass None for infinite retries
    pub fn with_max_reconnect_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Replace the reconnect delay schedule
    pub fn with_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set how undecodable frames are handled
    pub fn with_malformed_frames(mut self, policy: MalformedFramePolicy) -> Self {
        self.malformed_frames = policy;
        self
    }

    /// Set the broadcast buffer capacity (clamped to at least 1)
    pub fn with_event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity.max(1);
        self
    }
}
