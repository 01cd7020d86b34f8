//! Shared realtime connection management.
//!
//! This module contains:
//! - [`supervisor`]: single background task that owns the live connection
//!   generation and reconciles it with the required channel set
//! - [`session`]: one connection generation (connect, receive loop,
//!   backoff-governed reconnects for the same channel set)

pub(crate) mod session;
pub(crate) mod supervisor;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

use crate::connectivity::ConnectivityObserver;
use crate::demux::FrameDemultiplexer;
use crate::event_handlers::EventHandlers;
use crate::models::ConnectionOptions;
use crate::timeouts::RealtimeTimeouts;
use crate::transport::Transport;

pub(crate) use supervisor::ConnectionSupervisor;

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Lifecycle state of the shared connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No live connection; nothing is required or retries were given up.
    #[default]
    Idle,
    /// Waiting for connectivity, dialing, or waiting out a backoff delay.
    Connecting,
    /// Connected and running the receive loop.
    Open,
    /// Closing the live connection.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        };
        write!(f, "{}", name)
    }
}

/// Why the supervisor stopped a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    ChannelsChanged,
    NoChannels,
    Shutdown,
}

impl StopReason {
    pub fn message(self) -> &'static str {
        match self {
            StopReason::ChannelsChanged => "Required channel set changed",
            StopReason::NoChannels => "No channels required",
            StopReason::Shutdown => "Client shut down",
        }
    }
}

/// Everything a connection generation needs, shared by the supervisor and
/// every session it spawns.
pub(crate) struct SessionContext {
    pub transport: Arc<dyn Transport>,
    pub connectivity: Arc<dyn ConnectivityObserver>,
    pub endpoint: Url,
    pub project: String,
    pub options: ConnectionOptions,
    pub timeouts: RealtimeTimeouts,
    pub demux: FrameDemultiplexer,
    pub handlers: EventHandlers,
    pub state_tx: watch::Sender<ConnectionState>,
}

impl SessionContext {
    pub fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                log::debug!("[realtime-link] Connection state {} -> {}", current, state);
                *current = state;
                true
            }
        });
    }
}
