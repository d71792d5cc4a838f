//! Error taxonomy of the client.
//!
//! Every HTTP failure is classified once, by status code, into an
//! [`ApiError`] whose [`ErrorKind`] tells the caller how to react. Local
//! argument checks fail with [`FgaError::InvalidParameter`] before any I/O.

mod classify;
mod validation;

use std::collections::BTreeMap;
use std::fmt;

use fga_http::HttpError;
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

use crate::retry::should_retry;

pub use classify::{REQUEST_ID_HEADER, classify};
pub(crate) use classify::classify_failure;
pub use validation::ValidationDetails;

/// Errors returned by the OpenFGA client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FgaError {
    /// The server answered with a non-2xx status.
    #[error(transparent)]
    Api(Box<ApiError>),

    /// A required argument was missing or blank. Raised before any I/O.
    #[error("Required parameter {param} was invalid when calling {context}.")]
    InvalidParameter { param: String, context: String },

    /// No response was received (connect failure, timeout, TLS, ...).
    ///
    /// `previous` is the failure of the attempt before this one, when the
    /// call was being retried.
    #[error("[{operation}] transport error: {source}")]
    Transport {
        operation: String,
        #[source]
        source: HttpError,
        previous: Option<Box<FgaError>>,
    },

    /// The request body could not be encoded.
    #[error("[{operation}] failed to encode request: {source}")]
    Encode {
        operation: String,
        #[source]
        source: HttpError,
    },

    /// A 2xx body did not match the expected shape.
    #[error("[{operation}] failed to decode response: {source}")]
    Decode {
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FgaError {
    pub fn invalid_parameter(param: impl Into<String>, context: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            context: context.into(),
        }
    }

    pub(crate) fn transport(operation: impl Into<String>, source: HttpError) -> Self {
        Self::Transport {
            operation: operation.into(),
            source,
            previous: None,
        }
    }

    /// Failure of the attempt before this one, if the call was retried.
    #[must_use]
    pub fn previous(&self) -> Option<&FgaError> {
        match self {
            Self::Api(err) => err.previous(),
            Self::Transport { previous, .. } => previous.as_deref(),
            _ => None,
        }
    }

    /// The classified API error, if this is one.
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api(err) => err.is_retryable(),
            Self::Transport { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<ApiError> for FgaError {
    fn from(err: ApiError) -> Self {
        Self::Api(Box::new(err))
    }
}

/// What kind of failure a non-2xx response represents.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// `400`, `422`
    Validation(ValidationDetails),
    /// `401`, `403`
    Authentication,
    /// `404`
    NotFound,
    /// `429`
    RateLimitExceeded,
    /// `5xx` except `501`
    InternalServer,
    /// Any other non-2xx status, `501` included.
    Unclassified,
}

impl ErrorKind {
    /// Kind for a non-2xx status. Validation details start empty.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 | 422 => Self::Validation(ValidationDetails::default()),
            401 | 403 => Self::Authentication,
            404 => Self::NotFound,
            429 => Self::RateLimitExceeded,
            500 | 502..=599 => Self::InternalServer,
            _ => Self::Unclassified,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Authentication => "authentication",
            Self::NotFound => "not_found",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::InternalServer => "internal_server",
            Self::Unclassified => "unclassified",
        }
    }
}

/// A classified non-2xx response.
///
/// `Display` renders `[operation] message (code)`, degrading to
/// `[operation] message` and then to `operation` alone.
#[derive(Debug)]
pub struct ApiError {
    pub(crate) kind: ErrorKind,
    pub(crate) status: StatusCode,
    pub(crate) operation: String,
    pub(crate) method: Method,
    pub(crate) request_url: String,
    pub(crate) request_id: Option<String>,
    pub(crate) api_error_code: Option<String>,
    pub(crate) api_error_message: Option<String>,
    pub(crate) retry_after_raw: Option<String>,
    pub(crate) client_id: Option<String>,
    pub(crate) audience: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: String,
    pub(crate) metadata: BTreeMap<String, String>,
    pub(crate) previous: Option<Box<FgaError>>,
}

impl ApiError {
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn request_url(&self) -> &str {
        &self.request_url
    }

    /// Value of the `x-request-id` response header.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    #[must_use]
    pub fn api_error_code(&self) -> Option<&str> {
        self.api_error_code.as_deref()
    }

    #[must_use]
    pub fn api_error_message(&self) -> Option<&str> {
        self.api_error_message.as_deref()
    }

    /// Raw `Retry-After` header, unparsed.
    #[must_use]
    pub fn retry_after_raw(&self) -> Option<&str> {
        self.retry_after_raw.as_deref()
    }

    /// Client id of the client-credentials configuration, if any.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    #[must_use]
    pub fn audience(&self) -> Option<&str> {
        self.audience.as_deref()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response body, lossily decoded and capped at
    /// [`ERROR_BODY_PREVIEW_LIMIT`](fga_http::security::ERROR_BODY_PREVIEW_LIMIT).
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Error of the attempt before this one, when the call was retried.
    #[must_use]
    pub fn previous(&self) -> Option<&FgaError> {
        self.previous.as_deref()
    }

    /// Validation details, for `Validation` errors.
    #[must_use]
    pub fn validation(&self) -> Option<&ValidationDetails> {
        match &self.kind {
            ErrorKind::Validation(details) => Some(details),
            _ => None,
        }
    }

    /// Attach a key/value for structured logging. Classified fields are untouched.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_metadata(key, value);
        self
    }

    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn message(&self) -> String {
        match (&self.api_error_message, &self.api_error_code) {
            (Some(message), Some(code)) => format!("[{}] {message} ({code})", self.operation),
            (Some(message), None) => format!("[{}] {message}", self.operation),
            _ => self.operation.clone(),
        }
    }

    /// Log-friendly rendering:
    /// `[write] HTTP 400 type 'user' not found (validation_error) [request-id: abc]`.
    #[must_use]
    pub fn detailed_message(&self) -> String {
        let mut out = format!("[{}] HTTP {}", self.operation, self.status.as_u16());
        if let Some(message) = &self.api_error_message {
            out.push(' ');
            out.push_str(message);
        }
        if let Some(code) = &self.api_error_code {
            out.push_str(" (");
            out.push_str(code);
            out.push(')');
        }
        if let Some(request_id) = &self.request_id {
            out.push_str(" [request-id: ");
            out.push_str(request_id);
            out.push(']');
        }
        out
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        should_retry(self.status.as_u16())
    }

    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Server reported `code: "validation_error"`.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        self.api_error_code.as_deref() == Some("validation_error")
    }

    #[must_use]
    pub fn is_rate_limit_error(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS
            || self.api_error_code.as_deref() == Some("rate_limit_exceeded")
    }

    #[must_use]
    pub fn is_not_found_error(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Authentication)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.previous
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
