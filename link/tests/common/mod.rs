//! Shared helpers for realtime-link integration tests.
//!
//! [`MockTransport`] stands in for the realtime server: it records every
//! connect request with its (virtual) timestamp and lets a test push frames
//! into, or drop, the live connection.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::FutureExt;
use realtime_link::{
    ChannelSet, ConnectRequest, ConnectionOptions, DuplexStream, EventHandlers, IncomingMessage,
    RealtimeClient, RealtimeError, RealtimeTimeouts, Result, Subscription, Transport,
};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

pub const ENDPOINT: &str = "https://realtime.test/v1";
pub const PROJECT: &str = "test-project";

/// Upper bound (virtual time) for waiting on an expected connect.
const WAIT_LIMIT: Duration = Duration::from_secs(3600);

/// One recorded `connect` call.
#[derive(Debug, Clone)]
pub struct ConnectRecord {
    pub request: ConnectRequest,
    pub at: Instant,
    pub failed: bool,
}

enum ServerCommand {
    Frame(String),
    Undecodable(String),
    Drop,
}

#[derive(Default)]
struct MockState {
    connects: Vec<ConnectRecord>,
    live: Option<(usize, mpsc::UnboundedSender<ServerCommand>)>,
    fail_remaining: usize,
    closes: usize,
    next_conn_id: usize,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    connected: Arc<Notify>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next(&self, count: usize) {
        self.state.lock().unwrap().fail_remaining = count;
    }

    /// Number of connect calls, failed ones included.
    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects.len()
    }

    pub fn connects(&self) -> Vec<ConnectRecord> {
        self.state.lock().unwrap().connects.clone()
    }

    /// Channel set of every connect call, in order.
    pub fn connected_channel_sets(&self) -> Vec<ChannelSet> {
        self.connects().iter().map(|c| c.request.channels()).collect()
    }

    /// Graceful closes performed by the client.
    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().closes
    }

    pub fn has_live_connection(&self) -> bool {
        self.state.lock().unwrap().live.is_some()
    }

    /// Wait (in virtual time when paused) until at least `count` connect calls
    /// were made.
    pub async fn wait_for_connects(&self, count: usize) {
        let wait = async {
            loop {
                let notified = self.connected.notified();
                if self.connect_count() >= count {
                    return;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(WAIT_LIMIT, wait).await.is_err() {
            panic!(
                "expected {} connect call(s), saw {}",
                count,
                self.connect_count()
            );
        }
    }

    fn send_command(&self, command: ServerCommand) {
        let state = self.state.lock().unwrap();
        let (_, tx) = state.live.as_ref().expect("no live connection");
        tx.send(command).expect("connection already gone");
    }

    /// Push a raw text frame to the live connection.
    pub fn push_frame(&self, frame: impl Into<String>) {
        self.send_command(ServerCommand::Frame(frame.into()));
    }

    /// Push a frame whose bytes are not text (e.g. a non-UTF-8 binary frame).
    pub fn push_undecodable(&self) {
        self.send_command(ServerCommand::Undecodable(
            "Binary frame is not UTF-8".to_string(),
        ));
    }

    pub fn push_event(&self, channels: &[&str], payload: JsonValue) {
        let frame = serde_json::json!({
            "type": "event",
            "data": { "channels": channels, "payload": payload },
        });
        self.push_frame(frame.to_string());
    }

    pub fn push_error(&self, message: &str, code: Option<i64>) {
        let frame = serde_json::json!({
            "type": "error",
            "data": { "message": message, "code": code },
        });
        self.push_frame(frame.to_string());
    }

    /// Simulate the server closing the live connection.
    pub fn drop_connection(&self) {
        let mut state = self.state.lock().unwrap();
        let (_, tx) = state.live.take().expect("no live connection");
        let _ = tx.send(ServerCommand::Drop);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn DuplexStream>> {
        let result = {
            let mut state = self.state.lock().unwrap();
            let failed = state.fail_remaining > 0;
            state.connects.push(ConnectRecord {
                request: request.clone(),
                at: Instant::now(),
                failed,
            });
            if failed {
                state.fail_remaining -= 1;
                Err(RealtimeError::WebSocketError("connection refused".to_string()))
            } else {
                let (tx, rx) = mpsc::unbounded_channel();
                let id = state.next_conn_id;
                state.next_conn_id += 1;
                state.live = Some((id, tx));
                Ok(Box::new(MockConnection {
                    id,
                    rx,
                    state: self.state.clone(),
                }) as Box<dyn DuplexStream>)
            }
        };
        self.connected.notify_waiters();
        result
    }
}

struct MockConnection {
    id: usize,
    rx: mpsc::UnboundedReceiver<ServerCommand>,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl DuplexStream for MockConnection {
    async fn send(&mut self, _frame: String) -> Result<()> {
        Ok(())
    }

    async fn receive(&mut self) -> Option<Result<IncomingMessage>> {
        match self.rx.recv().await {
            Some(ServerCommand::Frame(text)) => Some(Ok(IncomingMessage::Text(text))),
            Some(ServerCommand::Undecodable(reason)) => {
                Some(Ok(IncomingMessage::Undecodable(reason)))
            },
            Some(ServerCommand::Drop) | None => None,
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        if matches!(state.live, Some((id, _)) if id == self.id) {
            state.live = None;
        }
        Ok(())
    }
}

/// Callback counters wired into [`EventHandlers`].
#[derive(Clone, Default)]
pub struct HandlerCounters {
    pub connects: Arc<AtomicUsize>,
    pub planned_disconnects: Arc<AtomicUsize>,
    pub unplanned_disconnects: Arc<AtomicUsize>,
    pub errors: Arc<AtomicUsize>,
    /// Message of every disconnect, in order.
    pub disconnect_messages: Arc<Mutex<Vec<String>>>,
}

impl HandlerCounters {
    pub fn handlers(&self) -> EventHandlers {
        let connects = self.connects.clone();
        let planned = self.planned_disconnects.clone();
        let unplanned = self.unplanned_disconnects.clone();
        let errors = self.errors.clone();
        let messages = self.disconnect_messages.clone();
        EventHandlers::new()
            .on_connect(move |_| {
                connects.fetch_add(1, Ordering::SeqCst);
            })
            .on_disconnect(move |reason| {
                messages.lock().unwrap().push(reason.message.clone());
                if reason.planned {
                    planned.fetch_add(1, Ordering::SeqCst);
                } else {
                    unplanned.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_error(move |_| {
                errors.fetch_add(1, Ordering::SeqCst);
            })
    }

    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn disconnect_messages(&self) -> Vec<String> {
        self.disconnect_messages.lock().unwrap().clone()
    }
}

/// Client wired to `transport` with a 50 ms unsubscribe debounce.
pub fn test_client(transport: &MockTransport) -> RealtimeClient {
    test_client_with(transport, ConnectionOptions::default(), EventHandlers::new())
}

pub fn test_client_with(
    transport: &MockTransport,
    options: ConnectionOptions,
    handlers: EventHandlers,
) -> RealtimeClient {
    RealtimeClient::builder()
        .endpoint(ENDPOINT)
        .project(PROJECT)
        .transport(Arc::new(transport.clone()))
        .connection_options(options)
        .timeouts(RealtimeTimeouts::for_testing(50))
        .event_handlers(handlers)
        .build()
        .expect("client builds")
}

pub fn channels(names: &[&str]) -> ChannelSet {
    names.iter().copied().collect()
}

/// Let spawned tasks run without advancing virtual time meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Poll `subscription` once so it registers its channels.
pub fn register<T: DeserializeOwned>(subscription: &mut Subscription<T>) {
    assert!(
        subscription.next().now_or_never().is_none(),
        "no event expected before registration"
    );
    assert!(subscription.is_registered());
}
