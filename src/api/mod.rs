//! Remote API boundary.
//!
//! The sync core only sees [`RemoteApi`]: JSON in, JSON or a [`RawError`]
//! out. `ApiClient` is the production implementation over HTTP.

mod auth;
mod client;
#[cfg(test)]
pub(crate) mod fake;

pub use auth::{AuthTokenProvider, CachedTokenProvider, StaticToken};
pub use client::ApiClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RawError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Opaque access to the dashboard API.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Send a request; `Value::Null` for empty success bodies.
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, RawError>;

    async fn get(&self, path: &str) -> Result<Value, RawError> {
        self.send(Method::Get, path, None).await
    }
}
