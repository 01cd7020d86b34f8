//! Data models for realtime-link.
//!
//! Defines the inbound frame schema of the realtime endpoint, the event
//! type handed to subscribers, and connection configuration.

pub mod channel_set;
pub mod connection_options;
pub mod error_info;
pub mod event_notification;
pub mod inbound_frame;
pub mod reconnect_backoff;


pub use channel_set::ChannelSet;
pub use connection_options::{ConnectionOptions, MalformedFramePolicy};
pub use error_info::ErrorInfo;
pub use event_notification::EventNotification;
pub use inbound_frame::{EventFrame, InboundFrame};
pub use reconnect_backoff::{BackoffStep, ReconnectBackoff};
