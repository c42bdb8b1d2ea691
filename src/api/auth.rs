//! Bearer token providers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::sync::Cache;
use tracing::debug;

use crate::error::RawError;

/// Supplies the bearer token for outgoing calls. `None` means signed out.
#[async_trait]
pub trait AuthTokenProvider: Send + Sync {
    async fn token(&self) -> Result<Option<String>, RawError>;

    /// Forget any cached token (called after a 401).
    fn invalidate(&self) {}
}

/// Fixed token from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

#[async_trait]
impl AuthTokenProvider for StaticToken {
    async fn token(&self) -> Result<Option<String>, RawError> {
        Ok(self.0.clone())
    }
}

/// Caches tokens from a slower provider for a short TTL.
///
/// Identity providers mint short-lived tokens and rate-limit the mint
/// endpoint, so every request asking for a new one is wasteful.
pub struct CachedTokenProvider {
    inner: Arc<dyn AuthTokenProvider>,
    cache: Cache<(), String>,
}

impl CachedTokenProvider {
    pub fn new(inner: Arc<dyn AuthTokenProvider>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
        }
    }
}

#[async_trait]
impl AuthTokenProvider for CachedTokenProvider {
    async fn token(&self) -> Result<Option<String>, RawError> {
        if let Some(token) = self.cache.get(&()) {
            return Ok(Some(token));
        }

        debug!("Token cache miss");
        let token = self.inner.token().await?;
        if let Some(token) = &token {
            self.cache.insert((), token.clone());
        }
        Ok(token)
    }

    fn invalidate(&self) {
        self.cache.invalidate(&());
        self.inner.invalidate();
    }
}
