//! Realtime client with builder pattern.
//!
//! Owns the subscription registry and the connection supervisor, and hands
//! out [`Subscription`] streams that all share one connection.

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use url::Url;

use crate::{
    connection::{ConnectionState, ConnectionSupervisor, SessionContext},
    connectivity::{AlwaysOnline, ConnectivityObserver},
    demux::FrameDemultiplexer,
    error::{RealtimeError, Result},
    event_handlers::EventHandlers,
    models::{ChannelSet, ConnectionOptions},
    registry::SubscriptionRegistry,
    subscription::Subscription,
    timeouts::RealtimeTimeouts,
    transport::{resolve_realtime_url, Transport, WebSocketTransport},
};

/// Realtime subscription client.
///
/// Cloning is cheap; every clone shares the same connection. The connection
/// is closed when [`shutdown`](RealtimeClient::shutdown) is called or the
/// last clone is dropped.
///
/// # Examples
///
/// ```rust,no_run
/// use realtime_link::RealtimeClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RealtimeClient::builder()
///     .endpoint("https://realtime.example.com/v1")
///     .project("demo")
///     .build()?;
///
/// let mut orders = client.subscribe(["orders", "refunds"]);
/// let mut alerts = client.subscribe(["alerts"]);
///
/// tokio::select! {
///     Some(event) = orders.next() => println!("order: {:?}", event?),
///     Some(event) = alerts.next() => println!("alert: {:?}", event?),
///     else => {},
/// }
///
/// client.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    endpoint: Url,
    project: String,
    registry: Arc<SubscriptionRegistry>,
    demux: FrameDemultiplexer,
    supervisor: ConnectionSupervisor,
    options: ConnectionOptions,
    timeouts: RealtimeTimeouts,
}

impl RealtimeClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> RealtimeClientBuilder {
        RealtimeClientBuilder::new()
    }

    /// Subscribe to raw events on `channels`.
    ///
    /// The returned stream is lazy: the channels are added to the shared
    /// connection when it is first polled, and removed when it is dropped.
    pub fn subscribe<I, S>(&self, channels: I) -> Subscription<JsonValue>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscribe_as::<JsonValue, I, S>(channels)
    }

    /// Subscribe to events on `channels` whose payload decodes as `T`.
    ///
    /// Events with payloads that do not decode as `T` are skipped.
    pub fn subscribe_as<T, I, S>(&self, channels: I) -> Subscription<T>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels: Vec<String> = channels.into_iter().map(Into::into).collect();
        if channels.is_empty() {
            log::warn!("[realtime-link] Subscribing with an empty channel list; no event will match");
        }
        Subscription::new(
            channels,
            self.inner.registry.clone(),
            self.inner.demux.clone(),
            self.inner.supervisor.shutdown_token(),
        )
    }

    /// Union of the channels of every registered subscription.
    pub fn required_channels(&self) -> ChannelSet {
        self.inner.registry.required()
    }

    /// Number of registered subscriptions.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.supervisor.state()
    }

    /// Watch connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.supervisor.state_changes()
    }

    /// Realtime endpoint URL (without query parameters).
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    pub fn project(&self) -> &str {
        &self.inner.project
    }

    /// Get the configured connection options
    pub fn connection_options(&self) -> &ConnectionOptions {
        &self.inner.options
    }

    /// Get the configured timeouts
    pub fn timeouts(&self) -> &RealtimeTimeouts {
        &self.inner.timeouts
    }

    /// Close the connection and end every subscription stream.
    ///
    /// Waits until the live connection (if any) has been closed.
    pub async fn shutdown(&self) {
        log::info!("[realtime-link] Shutting down realtime client");
        self.inner.supervisor.shutdown().await;
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.supervisor.is_shut_down()
    }
}

impl fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("endpoint", &self.inner.endpoint.as_str())
            .field("project", &self.inner.project)
            .field("state", &self.connection_state())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

/// Builder for configuring [`RealtimeClient`] instances.
pub struct RealtimeClientBuilder {
    endpoint: Option<String>,
    project: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    connectivity: Option<Arc<dyn ConnectivityObserver>>,
    connection_options: ConnectionOptions,
    timeouts: RealtimeTimeouts,
    event_handlers: EventHandlers,
}

impl RealtimeClientBuilder {
    fn new() -> Self {
        Self {
            endpoint: None,
            project: None,
            transport: None,
            connectivity: None,
            connection_options: ConnectionOptions::default(),
            timeouts: RealtimeTimeouts::default(),
            event_handlers: EventHandlers::default(),
        }
    }

    /// Base endpoint; `realtime` is appended as a path segment.
    ///
    /// Accepts `http`, `https`, `ws` and `wss` URLs.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Project identifier sent with every connect request.
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Transport used to open connections. Defaults to [`WebSocketTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Connectivity observer consulted before each connect. Defaults to
    /// [`AlwaysOnline`].
    pub fn connectivity(mut self, connectivity: Arc<dyn ConnectivityObserver>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    pub fn timeouts(mut self, timeouts: RealtimeTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Build the client and start its connection supervisor.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<RealtimeClient> {
        let endpoint = self
            .endpoint
            .ok_or_else(|| RealtimeError::ConfigurationError("endpoint is required".into()))?;
        let endpoint = resolve_realtime_url(&endpoint)?;

        let project = self
            .project
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| RealtimeError::ConfigurationError("project is required".into()))?;

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(RealtimeError::ConfigurationError(
                "RealtimeClient must be built inside a tokio runtime".into(),
            ));
        }

        let transport = self.transport.unwrap_or_else(|| Arc::new(WebSocketTransport::new()));
        let connectivity = self.connectivity.unwrap_or_else(|| Arc::new(AlwaysOnline::new()));
        let demux = FrameDemultiplexer::new(self.connection_options.event_buffer_capacity);
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Idle);
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SubscriptionRegistry::new(changes_tx));

        log::debug!(
            "[realtime-link] Building client for {} (project={})",
            endpoint,
            project
        );

        let ctx = Arc::new(SessionContext {
            transport,
            connectivity,
            endpoint: endpoint.clone(),
            project: project.clone(),
            options: self.connection_options.clone(),
            timeouts: self.timeouts.clone(),
            demux: demux.clone(),
            handlers: self.event_handlers,
            state_tx,
        });
        let supervisor = ConnectionSupervisor::spawn(ctx, changes_rx);

        Ok(RealtimeClient {
            inner: Arc::new(ClientInner {
                endpoint,
                project,
                registry,
                demux,
                supervisor,
                options: self.connection_options,
                timeouts: self.timeouts,
            }),
        })
    }
}

impl Default for RealtimeClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_requires_endpoint_and_project() {
        let err = RealtimeClient::builder().project("p").build().unwrap_err();
        assert!(matches!(err, RealtimeError::ConfigurationError(_)));

        let err = RealtimeClient::builder()
            .endpoint("https://example.com")
            .project("   ")
            .build()
            .unwrap_err();
        assert!(matches!(err, RealtimeError::ConfigurationError(_)));
    }

    #[test]
    fn test_build_rejects_unsupported_scheme() {
        let err = RealtimeClient::builder()
            .endpoint("ftp://example.com")
            .project("p")
            .build()
            .unwrap_err();
        assert!(matches!(err, RealtimeError::ConfigurationError(_)));
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let err = RealtimeClient::builder()
            .endpoint("https://example.com")
            .project("p")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("tokio runtime"));
    }

    #[tokio::test]
    async fn test_build_resolves_realtime_endpoint() {
        let client = RealtimeClient::builder()
            .endpoint("https://example.com/v1/")
            .project("demo")
            .build()
            .unwrap();
        assert_eq!(client.endpoint().as_str(), "wss://example.com/v1/realtime");
        assert_eq!(client.project(), "demo");
        assert_eq!(client.connection_state(), ConnectionState::Idle);
        assert!(client.required_channels().is_empty());
        client.shutdown().await;
        assert!(client.is_shut_down());
    }

    #[tokio::test]
    async fn test_subscribe_is_lazy() {
        let client = RealtimeClient::builder()
            .endpoint("http://localhost:9")
            .project("demo")
            .build()
            .unwrap();
        let sub = client.subscribe(["x"]);
        assert_eq!(sub.channels().len(), 1);
        assert_eq!(client.active_subscriptions(), 0);
        drop(sub);
        client.shutdown().await;
    }
}
