//! Core types for Beacon.
//!
//! This crate provides the wire primitives shared by the client and any
//! server speaking the same protocol: the tagged [`Envelope`], its per-kind
//! payloads, the connection token, and the lifecycle state. No I/O lives here.

mod envelope;
mod payload;
mod token;

pub use envelope::{Envelope, Message, kind};
pub use payload::{
    ChatMessage, DirectMessage, MediaStatus, Notification, VideoAction, VideoSignal,
    VideoSignalError,
};
pub use token::{AuthToken, TokenParseError};

use std::fmt;

/// Errors raised while encoding or decoding wire envelopes.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid envelope json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// Fetching a token or completing the transport handshake.
    Connecting,
    /// Transport is up; envelopes flow both ways.
    Open,
    /// Transport is down. See [`Closure`] for whether a retry follows.
    Closed(Closure),
}

impl ConnectionState {
    /// True only while the transport is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// True when no automatic reconnect will happen from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Closed(Closure::Normal) | Self::Closed(Closure::Exhausted)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Open => f.write_str("open"),
            Self::Closed(closure) => write!(f, "closed ({closure})"),
        }
    }
}

/// How the transport came to be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closure {
    /// User-initiated; terminal.
    Normal,
    /// Network failure or server drop; a retry is pending.
    Abnormal,
    /// Retry budget spent; terminal until `connect` is called again.
    Exhausted,
}

impl fmt::Display for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Abnormal => f.write_str("abnormal"),
            Self::Exhausted => f.write_str("retries exhausted"),
        }
    }
}

/// WebSocket close code as seen by the connection core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure. The only code that suppresses reconnection.
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// Connection dropped without a close frame.
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    pub fn is_normal(self) -> bool {
        self == Self::NORMAL
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(ConnectionState::Idle.is_terminal());
        assert!(ConnectionState::Closed(Closure::Normal).is_terminal());
        assert!(ConnectionState::Closed(Closure::Exhausted).is_terminal());
        assert!(!ConnectionState::Closed(Closure::Abnormal).is_terminal());
        assert!(!ConnectionState::Open.is_terminal());
    }

    #[test]
    fn only_1000_is_normal() {
        assert!(CloseCode::NORMAL.is_normal());
        assert!(!CloseCode::ABNORMAL.is_normal());
        assert!(!CloseCode(1001).is_normal());
    }

    #[test]
    fn state_display() {
        assert_eq!(
            ConnectionState::Closed(Closure::Exhausted).to_string(),
            "closed (retries exhausted)"
        );
    }
}
