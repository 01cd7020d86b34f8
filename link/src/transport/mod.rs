//! Duplex-stream transport used by the connection supervisor.
//!
//! This module contains:
//! - [`Transport`] / [`DuplexStream`]: the seam the supervisor talks to
//! - [`ConnectRequest`]: realtime URL plus query parameters for one channel set
//! - [`websocket`]: the tokio-tungstenite implementation

pub mod websocket;

use async_trait::async_trait;
use url::Url;

use crate::error::{RealtimeError, Result};
use crate::models::ChannelSet;

pub use websocket::WebSocketTransport;

/// Path segment appended to the configured endpoint.
pub const REALTIME_PATH_SEGMENT: &str = "realtime";

/// Query parameter carrying the project identifier.
pub const PROJECT_QUERY_PARAM: &str = "project";

/// Query parameter repeated once per required channel.
pub const CHANNEL_QUERY_PARAM: &str = "channels[]";

/// Opens duplex streams to the realtime endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn DuplexStream>>;
}

/// A message read from a [`DuplexStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingMessage {
    /// A text frame, still to be parsed.
    Text(String),
    /// A frame whose bytes could not be turned into text. Handled like a
    /// frame that fails to parse; the connection itself is still usable.
    Undecodable(String),
}

/// One established connection.
///
/// `receive` yields `None` once the remote side has closed the stream, and
/// `Some(Err(_))` only for transport failures.
#[async_trait]
pub trait DuplexStream: Send {
    async fn send(&mut self, frame: String) -> Result<()>;

    async fn receive(&mut self) -> Option<Result<IncomingMessage>>;

    async fn close(&mut self) -> Result<()>;
}

/// Everything a transport needs to open a connection for one channel set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Realtime endpoint (base endpoint + `realtime`), without query
    pub url: Url,
    /// Query parameters in wire order
    pub query: Vec<(String, String)>,
}

impl ConnectRequest {
    /// Build the request for `channels`: one `project` parameter followed by
    /// one `channels[]` parameter per channel.
    pub fn for_channels(endpoint: &Url, project: &str, channels: &ChannelSet) -> Self {
        let mut query = Vec::with_capacity(channels.len() + 1);
        query.push((PROJECT_QUERY_PARAM.to_string(), project.to_string()));
        query.extend(
            channels
                .iter()
                .map(|c| (CHANNEL_QUERY_PARAM.to_string(), c.to_string())),
        );
        Self {
            url: endpoint.clone(),
            query,
        }
    }

    /// Channel names carried by this request.
    pub fn channels(&self) -> ChannelSet {
        self.query
            .iter()
            .filter(|(k, _)| k == CHANNEL_QUERY_PARAM)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Full URL with the query string applied.
    pub fn to_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        url
    }
}

/// Resolve the realtime endpoint from a configured base endpoint.
///
/// `http`/`https` are mapped to `ws`/`wss`; any query or fragment on the base
/// is dropped and the `realtime` segment is appended to its path.
pub fn resolve_realtime_url(base_url: &str) -> Result<Url> {
    let base = Url::parse(base_url.trim()).map_err(|e| {
        RealtimeError::ConfigurationError(format!("Invalid endpoint '{}': {}", base_url, e))
    })?;

    if base.host_str().is_none() {
        return Err(RealtimeError::ConfigurationError(format!(
            "Endpoint '{}' has no host",
            base_url
        )));
    }

    let ws_scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(RealtimeError::ConfigurationError(format!(
                "Unsupported endpoint scheme '{}'; expected http(s) or ws(s)",
                other
            )));
        },
    };

    let mut url = base.clone();
    url.set_scheme(ws_scheme).map_err(|_| {
        RealtimeError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| {
            RealtimeError::ConfigurationError(format!("Endpoint '{}' cannot have a path", base_url))
        })?
        .pop_if_empty()
        .push(REALTIME_PATH_SEGMENT);

    Ok(url)
}
