//! Frame demultiplexer.
//!
//! Decodes every inbound text frame into an [`InboundFrame`] and republishes
//! it on one broadcast channel shared by all subscribers. No filtering happens
//! here; each [`Subscription`](crate::Subscription) applies its own channel
//! and payload filters.

use tokio::sync::broadcast;

use crate::error::{RealtimeError, Result};
use crate::models::InboundFrame;

/// Decode one inbound text frame.
pub fn parse_frame(text: &str) -> Result<InboundFrame> {
    serde_json::from_str::<InboundFrame>(text).map_err(|e| {
        RealtimeError::SerializationError(format!("Failed to parse realtime frame: {}", e))
    })
}

/// Fan-out point between the receive loop and all subscribers.
#[derive(Debug, Clone)]
pub struct FrameDemultiplexer {
    tx: broadcast::Sender<InboundFrame>,
}

impl FrameDemultiplexer {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a frame to every current subscriber; returns how many
    /// subscribers received it.
    pub fn publish(&self, frame: InboundFrame) -> usize {
        match self.tx.send(frame) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(frame)) => {
                log::debug!("[realtime-link] Dropping {} frame: no active subscribers", frame.kind());
                0
            },
        }
    }

    /// Decode `text` and publish the result.
    pub fn dispatch(&self, text: &str) -> Result<usize> {
        let frame = parse_frame(text)?;
        Ok(self.publish(frame))
    }

    /// New receiver that sees every frame published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<InboundFrame> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
