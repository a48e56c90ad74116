//! Auth collaborator.
//!
//! Every connection attempt asks a [`TokenProvider`] for a fresh short-lived
//! token. A failed fetch counts as a failed attempt and goes through the
//! reconnection policy like any other.

use crate::error::AuthError;
use async_trait::async_trait;
use beacon_core::AuthToken;
use serde::Deserialize;
use std::future::Future;
use url::Url;

/// Source of connection tokens, called once per attempt.
#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    async fn fetch_token(&self) -> Result<AuthToken, AuthError>;
}

/// A fixed token. Useful for development servers and tests.
#[derive(Debug, Clone)]
pub struct StaticToken(AuthToken);

impl StaticToken {
    pub fn new(token: AuthToken) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn fetch_token(&self) -> Result<AuthToken, AuthError> {
        Ok(self.0.clone())
    }
}

/// Adapts an async closure into a [`TokenProvider`].
pub struct FnTokenProvider<F>(F);

/// Build a provider from `|| async { ... }`.
pub fn token_fn<F, Fut>(f: F) -> FnTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AuthToken, AuthError>> + Send + 'static,
{
    FnTokenProvider(f)
}

#[async_trait]
impl<F, Fut> TokenProvider for FnTokenProvider<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AuthToken, AuthError>> + Send + 'static,
{
    async fn fetch_token(&self) -> Result<AuthToken, AuthError> {
        (self.0)().await
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: AuthToken,
}

/// Fetches tokens from the REST API.
///
/// Issues `GET <endpoint>` with the session's bearer credential and expects
/// `{"token": "..."}` back.
#[derive(Debug, Clone)]
pub struct HttpTokenProvider {
    client: reqwest::Client,
    endpoint: Url,
    bearer: Option<String>,
}

impl HttpTokenProvider {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            bearer: None,
        }
    }

    /// Authenticate token requests with the user's API session.
    pub fn with_bearer(mut self, credential: impl Into<String>) -> Self {
        self.bearer = Some(credential.into());
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(&self) -> Result<AuthToken, AuthError> {
        let mut request = self.client.get(self.endpoint.clone());
        if let Some(bearer) = &self.bearer {
            request = request.bearer_auth(bearer);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected {
                status: status.as_u16(),
            });
        }
        let body: TokenResponse = response.json().await?;
        tracing::debug!(endpoint = %self.endpoint, "fetched connection token");
        Ok(body.token)
    }
}
