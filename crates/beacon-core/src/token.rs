//! Short-lived connection token.
//!
//! Tokens are issued by the REST API, consumed once at connect time, and
//! attached to the socket URL as the `token` query parameter. They are secrets,
//! so `Debug` never prints the value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single-use connection token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AuthToken(String);

impl AuthToken {
    /// The raw token value, for building the connect URL.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthToken(<{} bytes>)", self.0.len())
    }
}

impl FromStr for AuthToken {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TokenParseError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(TokenParseError::Whitespace);
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for AuthToken {
    type Error = TokenParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AuthToken> for String {
    fn from(token: AuthToken) -> Self {
        token.0
    }
}

/// Error parsing a token string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenParseError {
    #[error("token cannot be empty")]
    Empty,
    #[error("token cannot contain whitespace")]
    Whitespace,
}
