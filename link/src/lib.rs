//! # realtime-link
//!
//! Client-side realtime subscription multiplexer.
//!
//! Any number of independent consumers subscribe to overlapping sets of named
//! channels; all of them share one streaming connection. The connection is
//! reopened whenever the union of required channels changes, and re-established
//! with a stepped backoff when it drops.
//!
//! ## Features
//!
//! - One shared connection per [`RealtimeClient`], scoped to the union of all
//!   subscribed channels
//! - Lazy [`Subscription`] streams that register on first poll and
//!   deregister on drop
//! - Typed subscriptions via [`RealtimeClient::subscribe_as`]
//! - Debounced teardown when the channel set shrinks
//! - Connectivity-aware reconnects with configurable [`ReconnectBackoff`]
//! - Pluggable [`Transport`]; [`WebSocketTransport`] by default
//!
//! ## Example
//!
//! ```rust,no_run
//! use realtime_link::RealtimeClient;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct FileChange {
//!     id: String,
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RealtimeClient::builder()
//!     .endpoint("https://realtime.example.com/v1")
//!     .project("demo")
//!     .build()?;
//!
//! let mut files = client.subscribe_as::<FileChange, _, _>(["files"]);
//! while let Some(event) = files.next().await {
//!     println!("file changed: {}", event?.payload.id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod connectivity;
pub mod demux;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod registry;
pub mod subscription;
pub mod timeouts;
pub mod transport;

pub use client::{RealtimeClient, RealtimeClientBuilder};
pub use connection::ConnectionState;
pub use connectivity::{AlwaysOnline, ConnectivityObserver, NetworkMonitor};
pub use error::{RealtimeError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use models::{
    BackoffStep, ChannelSet, ConnectionOptions, ErrorInfo, EventFrame, EventNotification,
    InboundFrame, MalformedFramePolicy, ReconnectBackoff,
};
pub use registry::SubscriptionHandle;
pub use subscription::Subscription;
pub use timeouts::{RealtimeTimeouts, RealtimeTimeoutsBuilder};
pub use transport::{ConnectRequest, DuplexStream, IncomingMessage, Transport, WebSocketTransport};
