use thiserror::Error;

/// Classification of URL validation failures.
///
/// Match on this instead of the unstable `reason` text of
/// [`HttpError::InvalidUri`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL has no host
    MissingAuthority,
    /// URL has no scheme
    MissingScheme,
}

/// Errors raised by the transport. None of them carry an HTTP status:
/// every status, including 4xx/5xx, comes back as an `Ok(HttpResponse)`.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// A single attempt exceeded the configured request timeout
    #[error("Request attempt timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Network level failure (DNS, connect, reset, broken body stream)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// Request buffer is full
    #[error("Service overloaded: request buffer is full")]
    Overloaded,

    /// Buffer worker is gone
    #[error("Service unavailable: internal failure")]
    ServiceClosed,

    /// `reason` is diagnostic text only; match on `kind`.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        url: String,
        kind: InvalidUriKind,
        reason: String,
    },

    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme { scheme: String, reason: String },
}

impl HttpError {
    /// `true` when another attempt of the same request may succeed.
    ///
    /// Only network failures and per-attempt timeouts qualify; request
    /// construction and configuration errors fail the same way every time.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}
