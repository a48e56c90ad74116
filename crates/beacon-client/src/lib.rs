//! Client-side connection core for Beacon.
//!
//! One persistent socket per application: it authenticates with a one-shot
//! token, broadcasts every inbound envelope to registered handlers, reports
//! connectivity flips, and reconnects with exponential backoff after abnormal
//! closures until its retry budget runs out.
//!
//! ```rust,no_run
//! use beacon_client::{ClientConfig, ConnectionManager, StaticToken};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::from_env()?;
//! let manager = ConnectionManager::new(config, StaticToken::new("dev-token".parse()?));
//!
//! manager.on_connection_change(|up| println!("connected: {up}"));
//! manager.on_message(|envelope| println!("{} at {}", envelope.kind(), envelope.sent_at));
//! manager.connect();
//! manager.send_chat("course-101", "hello");
//! # Ok(())
//! # }
//! ```

mod auth;
mod config;
mod error;
mod manager;
mod policy;
mod registry;
mod transport;

pub use auth::{FnTokenProvider, HttpTokenProvider, StaticToken, TokenProvider, token_fn};
pub use config::{ClientConfig, ENV_BASE_DELAY, ENV_MAX_ATTEMPTS, ENV_URL, parse_url};
pub use error::{AuthError, ClientError, ConfigError, TransportError};
pub use manager::ConnectionManager;
pub use policy::ReconnectPolicy;
pub use registry::{ConnectionHandler, HandlerId, MessageHandler};
pub use transport::{Connection, Transport, TransportEvent, WsTransport, url_with_token};

pub use async_trait::async_trait;
pub use beacon_core::{
    AuthToken, CloseCode, Closure, ConnectionState, Envelope, MediaStatus, Message, Notification,
    VideoAction,
};
