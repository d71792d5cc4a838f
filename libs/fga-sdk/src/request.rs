use std::fmt;

use bytes::Bytes;
use fga_http::HttpError;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use url::Url;

use crate::error::FgaError;

/// Header telling the server which retry this is (1-based, absent on the first attempt).
pub const RETRY_ATTEMPT_HEADER: &str = "X-Retry-Attempt";

/// One logical API call, replayable across attempts.
#[derive(Clone)]
pub struct ApiRequest {
    operation: String,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Body may hold a client secret
        f.debug_struct("ApiRequest")
            .field("operation", &self.operation)
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

impl ApiRequest {
    /// `operation` names the call in errors, logs and telemetry.
    pub fn new(operation: impl Into<String>, method: Method, url: Url) -> Self {
        Self {
            operation: operation.into(),
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the JSON body.
    ///
    /// # Errors
    /// `FgaError::Encode` if serialization fails.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, FgaError> {
        let body = serde_json::to_vec(value).map_err(|e| self.encode_error(e.into()))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = body.into();
        Ok(self)
    }

    /// Serialize `value` as an `application/x-www-form-urlencoded` body.
    ///
    /// # Errors
    /// `FgaError::Encode` if serialization fails.
    pub fn form<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, FgaError> {
        let body = serde_urlencoded::to_string(value).map_err(|e| self.encode_error(e.into()))?;
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.body = body.into();
        Ok(self)
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
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[must_use]
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    fn encode_error(&self, source: HttpError) -> FgaError {
        FgaError::Encode {
            operation: self.operation.clone(),
            source,
        }
    }

    /// Build the wire request for one attempt.
    pub(crate) fn to_http(
        &self,
        attempt: u32,
        authorization: Option<HeaderValue>,
    ) -> Result<http::Request<Bytes>, FgaError> {
        let mut request = http::Request::builder()
            .method(self.method.clone())
            .uri(self.url.as_str())
            .body(self.body.clone())
            .map_err(|e| self.encode_error(e.into()))?;

        let headers = request.headers_mut();
        headers.extend(self.headers.clone());
        if let Some(value) = authorization {
            headers.insert(AUTHORIZATION, value);
        }
        if attempt > 0 {
            headers.insert(RETRY_ATTEMPT_HEADER, HeaderValue::from(attempt));
        }

        Ok(request)
    }
}
