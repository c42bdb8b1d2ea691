//! HTTP client for the dashboard API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{AuthTokenProvider, Method, RemoteApi};
use crate::error::RawError;

/// Production [`RemoteApi`] over reqwest.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    auth: Arc<dyn AuthTokenProvider>,
}

impl ApiClient {
    /// Create a client for the API rooted at `base`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base: Url, auth: Arc<dyn AuthTokenProvider>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("smallcap-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base: normalize_base(base),
            auth,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, RawError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|err| RawError::other(format!("invalid path {path:?}: {err}")))
    }
}

#[async_trait]
impl RemoteApi for ApiClient {
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, RawError> {
        let url = self.url(path)?;
        debug!("{:?} {}", method, url);

        let mut request = self.http.request(method.into(), url);
        if let Some(token) = self.auth.token().await? {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            self.auth.invalidate();
        }

        if status.is_success() {
            let bytes = response.bytes().await.map_err(transport_error)?;
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let text = response.text().await.unwrap_or_default();
        Err(error_from_body(status.as_u16(), &text))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base", &self.base.as_str()).finish()
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// Make sure relative joins append to the base path instead of replacing its
/// last segment.
fn normalize_base(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

fn transport_error(err: reqwest::Error) -> RawError {
    if let Some(status) = err.status() {
        return RawError::status(status.as_u16(), err.to_string());
    }
    if err.is_timeout() || err.is_connect() || err.is_request() {
        return RawError::network(err.to_string());
    }
    if err.is_decode() {
        return RawError::other(err.to_string()).with_code("decode");
    }
    RawError::other(err.to_string())
}

/// Pull `code`/`message` out of an error body.
///
/// Accepts `{"error": {"code", "message"}}`, `{"code", "message"}`,
/// `{"error": "..."}` and `{"detail": "..."}`; anything else becomes the message.
fn error_from_body(status: u16, body: &str) -> RawError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let Some(value) = parsed else {
        let message = if body.trim().is_empty() {
            format!("request failed with status {status}")
        } else {
            body.trim().to_string()
        };
        return RawError::status(status, message);
    };

    let object = match value.get("error") {
        Some(inner @ Value::Object(_)) => inner,
        _ => &value,
    };

    let code = object.get("code").and_then(Value::as_str);
    let message = object
        .get("message")
        .or_else(|| value.get("detail"))
        .or_else(|| value.get("error"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("request failed with status {status}"));

    let err = RawError::status(status, message);
    match code {
        Some(code) => err.with_code(code),
        None => err,
    }
}
