//! Connection lifecycle hooks.
//!
//! Subscribers never see transport failures; these callbacks are how an
//! application observes them:
//!
//! - [`on_connect`](EventHandlers::on_connect): a connection opened for a channel set
//! - [`on_disconnect`](EventHandlers::on_disconnect): the connection closed
//! - [`on_error`](EventHandlers::on_error): a connect attempt failed or a frame was rejected
//! - [`on_receive`](EventHandlers::on_receive): debug hook for every raw inbound frame
//!
//! # Example
//!
//! ```rust
//! use realtime_link::EventHandlers;
//!
//! let handlers = EventHandlers::new()
//!     .on_connect(|channels| println!("listening on {}", channels))
//!     .on_disconnect(|reason| println!("closed: {}", reason))
//!     .on_error(|error| eprintln!("realtime error: {}", error));
//! ```

use std::fmt;
use std::sync::Arc;

use crate::models::ChannelSet;

/// Reason for a disconnect event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
    /// `true` when the multiplexer closed the connection itself (channel set
    /// changed or emptied, or shutdown); `false` for drops it did not ask for.
    pub planned: bool,
}

impl DisconnectReason {
    pub fn planned(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            planned: true,
        }
    }

    pub fn unplanned(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            planned: false,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.planned {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (unplanned)", self.message)
        }
    }
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether the supervisor will retry after this error.
    pub recoverable: bool,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

pub type OnConnectCallback = Arc<dyn Fn(&ChannelSet) + Send + Sync>;
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;
pub type OnReceiveCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Connection lifecycle event handlers.
///
/// All handlers are optional. Handlers run on the connection task, so they
/// should return quickly.
#[derive(Clone, Default)]
pub struct EventHandlers {
    on_connect: Option<OnConnectCallback>,
    on_disconnect: Option<OnDisconnectCallback>,
    on_error: Option<OnErrorCallback>,
    on_receive: Option<OnReceiveCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when a connection opens. It receives the
    /// channel set the connection was opened with.
    pub fn on_connect(mut self, f: impl Fn(&ChannelSet) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when the connection closes, planned or not.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a connect attempt fails or an inbound
    /// frame is rejected.
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked with every raw inbound frame, before parsing.
    pub fn on_receive(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_error.is_some()
            || self.on_receive.is_some()
    }

    pub(crate) fn emit_connect(&self, channels: &ChannelSet) {
        if let Some(cb) = &self.on_connect {
            cb(channels);
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_receive(&self, raw: &str) {
        if let Some(cb) = &self.on_receive {
            cb(raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_empty_handlers_are_noops() {
        let handlers = EventHandlers::new();
        assert!(!handlers.has_any());
        handlers.emit_connect(&ChannelSet::new());
        handlers.emit_disconnect(DisconnectReason::planned("bye"));
        handlers.emit_error(ConnectionError::new("x", true));
        handlers.emit_receive("{}");
    }

    #[test]
    fn test_registered_handlers_fire() {
        let hits = Arc::new(AtomicUsize::new(0));
        let (h1, h2) = (hits.clone(), hits.clone());
        let handlers = EventHandlers::new()
            .on_connect(move |channels| {
                assert!(channels.contains("x"));
                h1.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |err| {
                assert!(err.recoverable);
                h2.fetch_add(10, Ordering::SeqCst);
            });

        assert!(handlers.has_any());
        handlers.emit_connect(&["x"].into_iter().collect());
        handlers.emit_error(ConnectionError::new("refused", true));
        assert_eq!(hits.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(DisconnectReason::planned("channels changed").to_string(), "channels changed");
        assert_eq!(
            DisconnectReason::unplanned("stream ended").to_string(),
            "stream ended (unplanned)"
        );
    }
}
