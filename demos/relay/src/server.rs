//! Relay server implementation.

use beacon_core::{Envelope, Notification};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

/// Which connect tokens the relay accepts.
#[derive(Debug, Default)]
pub struct TokenPolicy {
    allowed: HashSet<String>,
}

impl TokenPolicy {
    /// An empty list accepts any non-empty token.
    pub fn new(allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed: allowed.into_iter().filter(|t| !t.is_empty()).collect(),
        }
    }

    fn accepts(&self, token: &str) -> bool {
        !token.is_empty() && (self.allowed.is_empty() || self.allowed.contains(token))
    }
}

fn query_token(request: &Request) -> Option<String> {
    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}

pub async fn run(addr: SocketAddr, tokens: TokenPolicy) -> anyhow::Result<()> {
    let tokens = Arc::new(tokens);
    let (broadcast_tx, _) = broadcast::channel::<String>(100);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on ws://{}", addr);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let tokens = tokens.clone();
        let broadcast_tx = broadcast_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, tokens, broadcast_tx).await {
                tracing::warn!("Connection error from {}: {}", client_addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    tokens: Arc<TokenPolicy>,
    broadcast_tx: broadcast::Sender<String>,
) -> anyhow::Result<()> {
    let check = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match query_token(request) {
            Some(token) if tokens.accepts(&token) => Ok(response),
            _ => {
                let mut error = ErrorResponse::new(Some("invalid or missing token".into()));
                *error.status_mut() = StatusCode::UNAUTHORIZED;
                Err(error)
            }
        }
    };
    let ws = tokio_tungstenite::accept_hdr_async(stream, check).await?;
    let (mut sink, mut stream) = ws.split();

    tracing::debug!("New connection from {}", addr);

    // Greet the client so it sees traffic right after connecting
    let welcome = Envelope::notification(Notification {
        title: "Connected".into(),
        message: format!("{} client(s) online", broadcast_tx.receiver_count() + 1),
        ..Notification::default()
    });
    sink.send(Message::Text(welcome.to_json()?.into())).await?;

    let mut broadcast_rx = broadcast_tx.subscribe();

    loop {
        tokio::select! {
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => match Envelope::from_json(text.as_str()) {
                        // Relay the original text; envelopes are never rewritten.
                        Ok(envelope) => {
                            tracing::debug!(kind = envelope.kind(), from = %addr, "relaying envelope");
                            let _ = broadcast_tx.send(text.as_str().to_owned());
                        }
                        Err(e) => tracing::warn!("Invalid envelope from {}: {}", addr, e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }

            msg = broadcast_rx.recv() => match msg {
                Ok(text) => sink.send(Message::Text(text.into())).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("{} lagged; skipped {} envelopes", addr, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    tracing::debug!("Connection closed: {}", addr);
    Ok(())
}
