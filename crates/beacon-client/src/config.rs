//! Client configuration.
//!
//! Loaded from the environment (`BEACON_*` variables) or a TOML document:
//!
//! ```toml
//! url = "wss://lms.example.edu/ws"
//! reconnect_base_delay_ms = 1000
//! max_reconnect_attempts = 5
//! ```

use crate::error::ConfigError;
use crate::policy::ReconnectPolicy;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const ENV_URL: &str = "BEACON_WS_URL";
pub const ENV_BASE_DELAY: &str = "BEACON_RECONNECT_BASE_MS";
pub const ENV_MAX_ATTEMPTS: &str = "BEACON_MAX_RECONNECT_ATTEMPTS";

const DEFAULT_BASE_DELAY_MS: u64 = 1000;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Socket endpoint. The token is appended as `?token=` at connect time.
    pub url: Url,
    #[serde(default = "default_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_reconnect_attempts: u32,
}

impl ClientConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect_base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_reconnect_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the backoff base delay and retry budget.
    pub fn with_reconnect(mut self, base_delay: Duration, max_attempts: u32) -> Self {
        self.reconnect_base_delay_ms = u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX);
        self.max_reconnect_attempts = max_attempts;
        self
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_base_delay_ms)
    }

    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.base_delay(), self.max_reconnect_attempts)
    }

    /// Read `BEACON_WS_URL`, `BEACON_RECONNECT_BASE_MS` and
    /// `BEACON_MAX_RECONNECT_ATTEMPTS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Apply `BEACON_RECONNECT_BASE_MS` and `BEACON_MAX_RECONNECT_ATTEMPTS`
    /// when set, for callers that take the URL from elsewhere.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw = lookup(ENV_URL).ok_or(ConfigError::Missing(ENV_URL))?;
        Self::new(parse_url(&raw)?).with_overrides(lookup)
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_BASE_DELAY) {
            self.reconnect_base_delay_ms = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber {
                    key: ENV_BASE_DELAY,
                    value,
                })?;
        }
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            self.max_reconnect_attempts = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber {
                    key: ENV_MAX_ATTEMPTS,
                    value,
                })?;
        }
        Ok(self)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        check_scheme(&config.url)?;
        Ok(config)
    }
}

/// Parse and check a socket URL.
pub fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl {
        value: raw.to_string(),
        source,
    })?;
    check_scheme(&url)?;
    Ok(url)
}

fn check_scheme(url: &Url) -> Result<(), ConfigError> {
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[(ENV_URL, "ws://localhost:8080/ws")])).unwrap();
        assert_eq!(config.url.as_str(), "ws://localhost:8080/ws");
        assert_eq!(config.base_delay(), Duration::from_secs(1));
        assert_eq!(config.max_reconnect_attempts, 5);
    }

    #[test]
    fn env_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_URL, "wss://lms.example.edu/ws"),
            (ENV_BASE_DELAY, "250"),
            (ENV_MAX_ATTEMPTS, " 8 "),
        ]))
        .unwrap();
        assert_eq!(config.reconnect_base_delay_ms, 250);
        assert_eq!(config.max_reconnect_attempts, 8);
    }

    #[test]
    fn env_errors() {
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing(ENV_URL))
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(ENV_URL, "https://lms.example.edu")])),
            Err(ConfigError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(ENV_URL, "not a url")])),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup(&[(ENV_URL, "ws://h/"), (ENV_MAX_ATTEMPTS, "-1")])),
            Err(ConfigError::InvalidNumber { key: ENV_MAX_ATTEMPTS, .. })
        ));
    }

    #[test]
    fn toml_document() {
        let config = ClientConfig::from_toml_str(
            r#"
            url = "ws://127.0.0.1:9000/ws"
            max_reconnect_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_base_delay_ms, 1000);

        assert!(ClientConfig::from_toml_str("url = \"http://x\"").is_err());
        assert!(ClientConfig::from_toml_str("max_reconnect_attempts = 3").is_err());
    }

    #[test]
    fn policy_from_config() {
        let config = ClientConfig::new(parse_url("ws://h/").unwrap())
            .with_reconnect(Duration::from_millis(50), 2);
        let policy = config.policy();
        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.delay_for(2), Duration::from_millis(100));
    }

    #[test]
    fn oversized_delay_saturates() {
        let config = ClientConfig::new(parse_url("ws://h/").unwrap()).with_reconnect(Duration::MAX, 1);
        assert_eq!(config.reconnect_base_delay_ms, u64::MAX);
    }

    #[test]
    fn overrides_keep_the_given_url() {
        let config = ClientConfig::new(parse_url("ws://flag/ws").unwrap())
            .with_overrides(lookup(&[
                (ENV_URL, "ws://ignored/ws"),
                (ENV_BASE_DELAY, "40"),
                (ENV_MAX_ATTEMPTS, "2"),
            ]))
            .unwrap();
        assert_eq!(config.url.as_str(), "ws://flag/ws");
        assert_eq!(config.reconnect_base_delay_ms, 40);
        assert_eq!(config.max_reconnect_attempts, 2);

        let untouched = ClientConfig::new(parse_url("ws://flag/ws").unwrap())
            .with_overrides(lookup(&[]))
            .unwrap();
        assert_eq!(untouched.max_reconnect_attempts, 5);
    }
}
