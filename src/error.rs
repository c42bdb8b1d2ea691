//! Error taxonomy for the sync layer.
//!
//! A failed fetch or remote write is classified exactly once, where the raw
//! transport error enters the cache. Retry, rollback and UI code only ever
//! look at [`ErrorKind`], never at message text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure reported by a fetcher or remote call, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawError {
    /// HTTP status, if the request reached the server.
    pub status: Option<u16>,
    /// Machine-readable error code from the response body, if any.
    pub code: Option<String>,
    pub message: String,
    /// Connection/timeout failure (request never got a response).
    pub network: bool,
}

impl RawError {
    /// Error carrying an HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code: None,
            message: message.into(),
            network: false,
        }
    }

    /// Connection-level failure (DNS, refused, timeout).
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            network: true,
        }
    }

    /// Anything else: undecodable payloads, client bugs.
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            network: false,
        }
    }

    /// Attach a backend error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None if self.network => write!(f, "network error: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RawError {}

impl From<serde_json::Error> for RawError {
    fn from(err: serde_json::Error) -> Self {
        Self::other(format!("invalid payload: {err}")).with_code("decode")
    }
}

/// Failure taxonomy. Retry and backoff decisions depend on this alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    RateLimited,
    Transient,
    Unknown,
}

impl ErrorKind {
    /// Whether the retry scheduler may try again at all.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::Unknown)
    }

    /// Rate-limited keys wait for an explicit trigger before refetching.
    pub fn suppresses_automatic_revalidation(self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate limited",
            Self::Transient => "transient",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A normalized, tagged failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            code: None,
            message: message.into(),
        }
    }
}

impl From<RawError> for ClassifiedError {
    fn from(raw: RawError) -> Self {
        classify(raw)
    }
}

/// Classify a raw failure.
///
/// Status codes win; connection failures without a status are transient;
/// everything else is unknown.
pub fn classify(raw: RawError) -> ClassifiedError {
    let kind = match raw.status {
        Some(404) => ErrorKind::NotFound,
        Some(401 | 403) => ErrorKind::Unauthorized,
        Some(429) => ErrorKind::RateLimited,
        Some(408) | Some(500..=599) => ErrorKind::Transient,
        Some(_) => ErrorKind::Unknown,
        None if raw.network => ErrorKind::Transient,
        None => ErrorKind::Unknown,
    };

    ClassifiedError {
        kind,
        status: raw.status,
        code: raw.code,
        message: raw.message,
    }
}

/// Errors raised by the cache store itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The cached value for a key is not of the requested type.
    #[error("cache entry '{key}' does not hold a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// No fetcher is registered for the key or its family.
    #[error("no fetcher registered for '{0}'")]
    NoFetcher(String),
}

/// Failure returned to the caller of a mutation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// The remote write failed; the optimistic value has been rolled back.
    #[error(transparent)]
    Remote(#[from] ClassifiedError),

    /// The optimistic update could not be applied to the cached value.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MutationError {
    /// Classified kind for UI toasts. Store errors count as unknown.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Remote(err) => err.kind,
            Self::Store(_) => ErrorKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_codes() {
        assert_eq!(classify(RawError::status(404, "gone")).kind, ErrorKind::NotFound);
        assert_eq!(classify(RawError::status(401, "no")).kind, ErrorKind::Unauthorized);
        assert_eq!(classify(RawError::status(403, "no")).kind, ErrorKind::Unauthorized);
        assert_eq!(classify(RawError::status(429, "slow down")).kind, ErrorKind::RateLimited);
        assert_eq!(classify(RawError::status(500, "boom")).kind, ErrorKind::Transient);
        assert_eq!(classify(RawError::status(503, "busy")).kind, ErrorKind::Transient);
        assert_eq!(classify(RawError::status(408, "timeout")).kind, ErrorKind::Transient);
        assert_eq!(classify(RawError::status(400, "bad")).kind, ErrorKind::Unknown);
    }

    #[test]
    fn test_classify_without_status() {
        assert_eq!(classify(RawError::network("refused")).kind, ErrorKind::Transient);
        assert_eq!(classify(RawError::other("weird")).kind, ErrorKind::Unknown);
    }

    #[test]
    fn test_classify_ignores_message_text() {
        let err = classify(RawError::status(500, "Too many requests, rate limit exceeded"));
        assert_eq!(err.kind, ErrorKind::Transient);
    }

    #[test]
    fn test_classify_keeps_status_and_code() {
        let err = classify(RawError::status(429, "slow").with_code("RATE_LIMITED"));
        assert_eq!(err.status, Some(429));
        assert_eq!(err.code.as_deref(), Some("RATE_LIMITED"));
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::Unknown.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::Unauthorized.is_retryable());
        assert!(!ErrorKind::RateLimited.is_retryable());
    }
}
