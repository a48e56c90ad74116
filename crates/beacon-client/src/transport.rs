//! Socket transport.
//!
//! The manager talks to the network through [`Transport`] and [`Connection`]
//! so that the lifecycle can be driven by an in-memory transport in tests.
//! [`WsTransport`] is the production implementation over tokio-tungstenite.

use crate::error::TransportError;
use async_trait::async_trait;
use beacon_core::{AuthToken, CloseCode};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

/// Something that happened on an open connection.
#[derive(Debug)]
pub enum TransportEvent {
    /// A text frame.
    Frame(String),
    /// A transport error. The close that follows drives the state change.
    Error(TransportError),
    /// The connection is gone. No further events follow.
    Closed { code: CloseCode, reason: String },
}

/// Opens connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: Url) -> Result<Box<dyn Connection>, TransportError>;
}

/// One open connection.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next event. Must be cancel-safe: dropping the future
    /// before it resolves loses nothing.
    async fn recv(&mut self) -> TransportEvent;

    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), TransportError>;
}

/// `url` with `token` set as the `token` query parameter.
///
/// Other query pairs are kept; a stale `token` pair is replaced.
pub fn url_with_token(url: &Url, token: &AuthToken) -> Url {
    let mut url = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "token")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("token", token.as_str());
    url
}

/// WebSocket transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: Url) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::debug!(status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WsConnection {
            stream,
            failed: false,
        }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    failed: bool,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> TransportEvent {
        if self.failed {
            return TransportEvent::Closed {
                code: CloseCode::ABNORMAL,
                reason: "transport failed".into(),
            };
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return TransportEvent::Frame(text.as_str().to_owned());
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return TransportEvent::Frame(text),
                    Err(_) => tracing::debug!(len = data.len(), "ignoring non-utf8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (
                            CloseCode(frame.code.into()),
                            frame.reason.as_str().to_owned(),
                        ),
                        // 1005: closed without a status code.
                        None => (CloseCode(1005), String::new()),
                    };
                    return TransportEvent::Closed { code, reason };
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Err(e)) => {
                    self.failed = true;
                    return TransportEvent::Error(e.into());
                }
                None => {
                    return TransportEvent::Closed {
                        code: CloseCode::ABNORMAL,
                        reason: "stream ended".into(),
                    };
                }
            }
        }
    }

    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<(), TransportError> {
        let frame = CloseFrame {
            code: code.0.into(),
            reason: reason.to_string().into(),
        };
        self.stream.close(Some(frame)).await?;
        Ok(())
    }
}
