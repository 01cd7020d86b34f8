//! WebSocket transport built on tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{error::Error as WsError, protocol::Message},
    MaybeTlsStream,
};

use super::{ConnectRequest, DuplexStream, IncomingMessage, Transport};
use crate::error::{RealtimeError, Result};

type WebSocketStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens realtime connections over WebSocket.
///
/// `wss://` endpoints need the `tls` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, request: &ConnectRequest) -> Result<Box<dyn DuplexStream>> {
        let url = request.to_url();
        log::debug!("[realtime-link] Opening WebSocket to {}", request.url);

        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => Ok(Box::new(WebSocketConnection { stream })),
            Err(WsError::Http(response)) => {
                let status = response.status();
                let body_text = response
                    .into_body()
                    .as_ref()
                    .and_then(|b| {
                        if b.is_empty() {
                            None
                        } else {
                            Some(String::from_utf8_lossy(b).into_owned())
                        }
                    })
                    .unwrap_or_default();
                let message = match status.as_u16() {
                    401 => "Unauthorized: realtime endpoint requires valid credentials".to_string(),
                    403 => "Forbidden: access to realtime endpoint denied".to_string(),
                    code if body_text.is_empty() => format!("WebSocket HTTP error: {}", code),
                    code => format!("WebSocket HTTP error {}: {}", code, body_text),
                };
                Err(RealtimeError::WebSocketError(message))
            },
            Err(e) => Err(RealtimeError::WebSocketError(format!("Connection failed: {}", e))),
        }
    }
}

struct WebSocketConnection {
    stream: WebSocketStream,
}

#[async_trait]
impl DuplexStream for WebSocketConnection {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| RealtimeError::WebSocketError(format!("Failed to send frame: {}", e)))
    }

    async fn receive(&mut self) -> Option<Result<IncomingMessage>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(Ok(IncomingMessage::Text(text.as_str().to_owned())));
                },
                Ok(Message::Binary(data)) => {
                    return Some(Ok(decode_binary(&data)));
                },
                Ok(Message::Ping(payload)) => {
                    if let Err(e) = self.stream.send(Message::Pong(payload)).await {
                        return Some(Err(RealtimeError::WebSocketError(format!(
                            "Failed to answer ping: {}",
                            e
                        ))));
                    }
                },
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {},
                Ok(Message::Close(frame)) => {
                    if let Some(f) = frame {
                        log::debug!(
                            "[realtime-link] Server closed connection: {} (code {})",
                            f.reason.as_str(),
                            u16::from(f.code)
                        );
                    }
                    return None;
                },
                Err(e) => return Some(Err(RealtimeError::WebSocketError(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(RealtimeError::WebSocketError(format!("Failed to close: {}", e))),
        }
    }
}

fn decode_binary(data: &[u8]) -> IncomingMessage {
    match std::str::from_utf8(data) {
        Ok(text) => IncomingMessage::Text(text.to_owned()),
        Err(e) => IncomingMessage::Undecodable(format!("Binary frame is not UTF-8: {}", e)),
    }
}
