//! Error types.
//!
//! None of these escape the public [`ConnectionManager`](crate::ConnectionManager)
//! operations; they surface through logs and the connectivity stream. They
//! are public for collaborators implementing [`TokenProvider`](crate::TokenProvider)
//! or [`Transport`](crate::Transport), and for configuration loading.

use beacon_core::TokenParseError;

/// Why a connection attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

/// The auth collaborator could not produce a token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("token endpoint answered {status}")]
    Rejected { status: u16 },
    #[error("token endpoint returned an unusable token: {0}")]
    InvalidToken(#[from] TokenParseError),
    #[error("{0}")]
    Provider(String),
}

/// The socket could not be opened or written.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection is closed")]
    Closed,
}

/// Invalid or missing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid url {value:?}: {source}")]
    InvalidUrl {
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("url scheme must be ws or wss, got {0:?}")]
    UnsupportedScheme(String),
    #[error("{key} must be a non-negative integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}
