//! Subscriber-facing event stream.
//!
//! A [`Subscription`] is a lazy, filtered view over the shared frame
//! broadcast. Nothing happens until it is first polled: at that point it
//! attaches a broadcast receiver and registers its handle, which may cause
//! the supervisor to reconnect with a larger channel set. The handle is
//! deregistered when the stream ends, fails, is closed, or is dropped.

use futures_util::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::demux::FrameDemultiplexer;
use crate::error::Result;
use crate::models::{ChannelSet, EventNotification, InboundFrame};
use crate::registry::{SubscriptionHandle, SubscriptionRegistry};

/// Deregisters its handle when dropped.
struct Registration {
    handle: SubscriptionHandle,
    registry: Arc<SubscriptionRegistry>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.deregister(self.handle);
    }
}

/// Stream of events published on any of the subscribed channels.
///
/// With `T = serde_json::Value` (the default, see
/// [`RealtimeClient::subscribe`](crate::RealtimeClient::subscribe)) every
/// matching event is yielded. With a concrete `T` (see
/// [`RealtimeClient::subscribe_as`](crate::RealtimeClient::subscribe_as))
/// events whose payload does not decode as `T` are skipped.
///
/// A server error frame ends the stream with a single
/// [`RealtimeError::ServerError`](crate::RealtimeError::ServerError).
///
/// # Examples
///
/// ```rust,no_run
/// use realtime_link::RealtimeClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RealtimeClient::builder()
///     .endpoint("https://realtime.example.com")
///     .project("demo")
///     .build()?;
///
/// let mut subscription = client.subscribe(["messages"]);
/// while let Some(event) = subscription.next().await {
///     match event {
///         Ok(event) => println!("{} -> {}", event.channels, event.payload),
///         Err(e) => eprintln!("Subscription failed: {}", e),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Subscription<T = JsonValue> {
    handle: SubscriptionHandle,
    requested: Vec<String>,
    channels: ChannelSet,
    registry: Arc<SubscriptionRegistry>,
    demux: FrameDemultiplexer,
    shutdown: Pin<Box<WaitForCancellationFutureOwned>>,
    /// Attached on first poll.
    frames: Option<BroadcastStream<InboundFrame>>,
    registration: Option<Registration>,
    closed: bool,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        requested: Vec<String>,
        registry: Arc<SubscriptionRegistry>,
        demux: FrameDemultiplexer,
        shutdown: CancellationToken,
    ) -> Self {
        let channels = requested.iter().cloned().collect();
        Self {
            handle: SubscriptionHandle::next(),
            requested,
            channels,
            registry,
            demux,
            shutdown: Box::pin(shutdown.cancelled_owned()),
            frames: None,
            registration: None,
            closed: false,
            _payload: PhantomData,
        }
    }

    /// Handle identifying this subscription in the registry.
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Channels this subscription listens on.
    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// `true` once the handle is in the registry (after the first poll).
    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    /// Stop listening and deregister. Further polls yield `None`.
    pub fn close(&mut self) {
        if !self.closed {
            log::debug!("[realtime-link] Closing subscription {}", self.handle);
        }
        self.finish();
    }

    fn finish(&mut self) {
        self.closed = true;
        self.frames = None;
        self.registration = None;
    }

    /// Attach to the broadcast before registering so no frame from the
    /// connection opened for this handle can be missed.
    fn ensure_registered(&mut self) {
        if self.registration.is_some() {
            return;
        }
        self.frames = Some(BroadcastStream::new(self.demux.subscribe()));
        self.registry.register(self.handle, self.requested.clone());
        self.registration = Some(Registration {
            handle: self.handle,
            registry: self.registry.clone(),
        });
    }
}

impl<T: DeserializeOwned> Subscription<T> {
    /// Next event, or `None` once the stream has ended.
    pub async fn next(&mut self) -> Option<Result<EventNotification<T>>> {
        futures_util::StreamExt::next(self).await
    }

    fn accept(&self, channels: ChannelSet, payload: JsonValue) -> Option<EventNotification<T>> {
        if !channels.intersects(&self.channels) {
            return None;
        }
        match serde_json::from_value::<T>(payload) {
            Ok(payload) => Some(EventNotification { channels, payload }),
            Err(e) => {
                log::debug!(
                    "[realtime-link] {} skipping event on {}: payload did not decode: {}",
                    self.handle,
                    channels,
                    e
                );
                None
            },
        }
    }
}

impl<T: DeserializeOwned> Stream for Subscription<T> {
    type Item = Result<EventNotification<T>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(None);
        }
        if this.shutdown.as_mut().poll(cx).is_ready() {
            log::debug!("[realtime-link] Client shut down; ending {}", this.handle);
            this.finish();
            return Poll::Ready(None);
        }
        this.ensure_registered();

        loop {
            let Some(frames) = this.frames.as_mut() else {
                return Poll::Ready(None);
            };
            match ready!(Pin::new(frames).poll_next(cx)) {
                None => {
                    this.finish();
                    return Poll::Ready(None);
                },
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    log::warn!(
                        "[realtime-link] {} lagged behind; {} frame(s) skipped",
                        this.handle,
                        skipped
                    );
                },
                Some(Ok(InboundFrame::Error(info))) => {
                    log::warn!(
                        "[realtime-link] {} terminated by server error: {}",
                        this.handle,
                        info.message
                    );
                    this.finish();
                    return Poll::Ready(Some(Err(info.into())));
                },
                Some(Ok(InboundFrame::Event(event))) => {
                    if let Some(notification) = this.accept(event.channels, event.payload) {
                        return Poll::Ready(Some(Ok(notification)));
                    }
                },
            }
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("handle", &self.handle)
            .field("channels", &self.channels)
            .field("registered", &self.registration.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorInfo, EventFrame};
    use crate::registry::RequiredSetChange;
    use serde::Deserialize;
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Arc<SubscriptionRegistry>,
        demux: FrameDemultiplexer,
        shutdown: CancellationToken,
        _changes: mpsc::UnboundedReceiver<RequiredSetChange>,
    }

    impl Fixture {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                registry: Arc::new(SubscriptionRegistry::new(tx)),
                demux: FrameDemultiplexer::new(64),
                shutdown: CancellationToken::new(),
                _changes: rx,
            }
        }

        fn subscribe<T>(&self, channels: &[&str]) -> Subscription<T> {
            Subscription::new(
                channels.iter().map(|c| c.to_string()).collect(),
                self.registry.clone(),
                self.demux.clone(),
                self.shutdown.clone(),
            )
        }

        fn event(&self, channels: &[&str], payload: JsonValue) {
            self.demux.publish(InboundFrame::Event(EventFrame {
                channels: channels.iter().copied().collect(),
                payload,
            }));
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Chat {
        text: String,
    }

    fn poll_once<T: DeserializeOwned>(
        sub: &mut Subscription<T>,
    ) -> Poll<Option<Result<EventNotification<T>>>> {
        let waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        Pin::new(sub).poll_next(&mut cx)
    }

    #[test]
    fn test_registration_is_lazy() {
        let fx = Fixture::new();
        let mut sub: Subscription = fx.subscribe(&["x"]);
        assert!(!sub.is_registered());
        assert!(fx.registry.is_empty());

        assert!(poll_once(&mut sub).is_pending());
        assert!(sub.is_registered());
        assert!(fx.registry.contains(sub.handle()));
    }

    #[test]
    fn test_drop_deregisters() {
        let fx = Fixture::new();
        let mut sub: Subscription = fx.subscribe(&["x"]);
        let _ = poll_once(&mut sub);
        let handle = sub.handle();
        drop(sub);
        assert!(!fx.registry.contains(handle));
    }

    #[test]
    fn test_close_deregisters_and_ends_stream() {
        let fx = Fixture::new();
        let mut sub: Subscription = fx.subscribe(&["x"]);
        let _ = poll_once(&mut sub);
        sub.close();
        assert!(sub.is_closed());
        assert!(fx.registry.is_empty());
        assert!(matches!(poll_once(&mut sub), Poll::Ready(None)));
    }

    #[tokio::test]
    async fn test_filters_by_channel_intersection() {
        let fx = Fixture::new();
        let mut sub: Subscription = fx.subscribe(&["x"]);
        let _ = poll_once(&mut sub);

        fx.event(&["y"], json!(1));
        fx.event(&["y", "x"], json!(2));

        let event = sub.next().await.unwrap().unwrap();
        assert_eq!(event.payload, json!(2));
        assert!(event.is_on("y"), "all published channels are reported");
    }

    #[tokio::test]
    async fn test_typed_subscription_skips_undecodable_payloads() {
        let fx = Fixture::new();
        let mut sub: Subscription<Chat> = fx.subscribe(&["chat"]);
        let _ = poll_once(&mut sub);

        fx.event(&["chat"], json!({"count": 3}));
        fx.event(&["chat"], json!("plain string"));
        fx.event(&["chat"], json!({"text": "hi"}));

        let event = sub.next().await.unwrap().unwrap();
        assert_eq!(
            event.payload,
            Chat {
                text: "hi".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_error_frame_is_terminal() {
        let fx = Fixture::new();
        let mut sub: Subscription = fx.subscribe(&["x"]);
        let _ = poll_once(&mut sub);

        fx.demux.publish(InboundFrame::Error(ErrorInfo {
            message: "boom".to_string(),
            code: Some(500),
        }));
        fx.event(&["x"], json!("after"));

        let err = sub.next().await.unwrap().unwrap_err();
        assert_eq!(err.server_message(), Some("boom"));
        assert!(sub.next().await.is_none());
        assert!(fx.registry.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_ends_stream() {
        let fx = Fixture::new();
        let mut sub: Subscription = fx.subscribe(&["x"]);
        let _ = poll_once(&mut sub);

        fx.shutdown.cancel();
        assert!(sub.next().await.is_none());
        assert!(fx.registry.is_empty());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_continues() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SubscriptionRegistry::new(tx));
        let demux = FrameDemultiplexer::new(2);
        let mut sub: Subscription = Subscription::new(
            vec!["x".to_string()],
            registry,
            demux.clone(),
            CancellationToken::new(),
        );
        let _ = poll_once(&mut sub);

        for i in 0..5 {
            demux.publish(InboundFrame::Event(EventFrame {
                channels: ["x"].into_iter().collect(),
                payload: json!(i),
            }));
        }

        let event = sub.next().await.unwrap().unwrap();
        assert_eq!(event.payload, json!(3));
    }
}
