//! [`ApiClient`]: configuration, credentials, retries and streaming behind
//! one handle.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use fga_http::{HttpClientBuilder, HttpError, HttpResponse, HttpTransport, TransportSecurity};
use fga_utils::SecretString;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::attempt::Orchestrator;
use crate::auth::{Authorizer, resolve_token_endpoint};
use crate::config::{Configuration, RequestOptions};
use crate::error::{ApiError, FgaError};
use crate::request::ApiRequest;
use crate::stream::{self, StreamLineError};
use crate::telemetry::TelemetrySink;
use crate::validation::assert_param_exists;

pub const STREAMED_LIST_OBJECTS_OPERATION: &str = "streamedListObjects";

const BUILD_OPERATION: &str = "buildClient";

/// One object id from `streamed-list-objects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamedListObjectsResponse {
    pub object: String,
}

/// Client for an OpenFGA server.
///
/// Cheap to clone. Clones share the transport and the token cache.
#[derive(Debug, Clone)]
pub struct ApiClient {
    config: Arc<Configuration>,
    base_url: Url,
    orchestrator: Orchestrator,
    authorizer: Authorizer,
}

impl ApiClient {
    /// Build a client with the default `fga-http` transport.
    ///
    /// Plain `http://` is accepted when the API URL or the token issuer
    /// uses it. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    /// `InvalidParameter` for an invalid configuration, `Transport` if the
    /// HTTP client cannot be built.
    pub fn new(config: Configuration) -> Result<Self, FgaError> {
        config.validate()?;
        let security = if uses_plain_http(&config)? {
            TransportSecurity::AllowInsecureHttp
        } else {
            TransportSecurity::TlsOnly
        };
        let http = HttpClientBuilder::new()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .transport(security)
            .build()
            .map_err(|source| FgaError::transport(BUILD_OPERATION, source))?;
        Self::with_transport(config, Arc::new(http))
    }

    /// Build a client over any [`HttpTransport`].
    ///
    /// # Errors
    /// `InvalidParameter` for an invalid configuration.
    pub fn with_transport(
        config: Configuration,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, FgaError> {
        config.validate()?;
        let base_url = config.parsed_api_url()?;
        let retry = config.retry_params(&RequestOptions::default())?;
        let authorizer = Authorizer::from_credentials(&config.credentials, retry)?;

        let mut orchestrator = Orchestrator::new(transport);
        if let Some(cc) = config.credentials.client_credentials() {
            orchestrator =
                orchestrator.with_client_identity(cc.client_id.clone(), cc.api_audience.clone());
        }

        Ok(Self {
            config: Arc::new(config),
            base_url,
            orchestrator,
            authorizer,
        })
    }

    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.orchestrator = self.orchestrator.with_telemetry(telemetry);
        self
    }

    #[must_use]
    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// Bearer token the next request would carry, `None` without credentials.
    ///
    /// # Errors
    /// Token exchange failures.
    pub async fn get_token(&self) -> Result<Option<SecretString>, FgaError> {
        self.authorizer.token(&self.orchestrator).await
    }

    /// Send `request` with retries. Configured and per-call headers are
    /// added unless the request already sets them.
    ///
    /// # Errors
    /// The classified error of the last attempt, or a transport error.
    pub async fn attempt(
        &self,
        mut request: ApiRequest,
        options: &RequestOptions,
    ) -> Result<HttpResponse, FgaError> {
        self.send_prepared(&mut request, options).await
    }

    /// Send `request` and decode the 2xx body. An empty body decodes as `null`.
    ///
    /// # Errors
    /// As [`attempt`](Self::attempt), plus `Decode` for a body of the wrong shape.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        mut request: ApiRequest,
        options: &RequestOptions,
    ) -> Result<T, FgaError> {
        let response = self.send_prepared(&mut request, options).await?;
        let body = response
            .bytes()
            .await
            .map_err(|source| transport_error(&request, source))?;
        decode_json(request.operation(), &body)
    }

    /// Classify a response to `request`; `None` for 2xx.
    #[must_use]
    pub fn classify(
        &self,
        request: &ApiRequest,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Option<ApiError> {
        let mut error = crate::error::classify(request, status, headers, body, None)?;
        if let Some(cc) = self.config.credentials.client_credentials() {
            error.client_id = Some(cc.client_id.clone());
            error.audience.clone_from(&cc.api_audience);
        }
        Some(error)
    }

    /// Send a streaming `request` and decode its NDJSON body.
    ///
    /// Retries cover the call up to the response head; once lines are being
    /// delivered the stream is never replayed.
    ///
    /// # Errors
    /// As [`attempt`](Self::attempt) and [`stream::decode_stream`].
    pub async fn stream<T, I, E>(
        &self,
        mut request: ApiRequest,
        options: &RequestOptions,
        on_item: I,
        on_error: E,
    ) -> Result<(), FgaError>
    where
        T: DeserializeOwned,
        I: FnMut(T),
        E: FnMut(StreamLineError),
    {
        let response = self.send_prepared(&mut request, options).await?;
        stream::decode_stream(&request, response, on_item, on_error).await
    }

    /// Stream the objects of a type the user can access.
    ///
    /// # Errors
    /// `InvalidParameter` for a blank `store_id` or a null body, before any
    /// request is sent. Otherwise as [`stream`](Self::stream).
    pub async fn streamed_list_objects<B, I, E>(
        &self,
        store_id: &str,
        body: &B,
        on_item: I,
        on_error: E,
        options: &RequestOptions,
    ) -> Result<(), FgaError>
    where
        B: Serialize + ?Sized,
        I: FnMut(StreamedListObjectsResponse),
        E: FnMut(StreamLineError),
    {
        assert_param_exists(Some(store_id), "storeId", STREAMED_LIST_OBJECTS_OPERATION)?;
        let body = serde_json::to_value(body).map_err(|source| FgaError::Encode {
            operation: STREAMED_LIST_OBJECTS_OPERATION.to_owned(),
            source: HttpError::Json(source),
        })?;
        if body.is_null() {
            return Err(FgaError::invalid_parameter(
                "body",
                STREAMED_LIST_OBJECTS_OPERATION,
            ));
        }

        let path = format!(
            "/stores/{}/streamed-list-objects",
            urlencoding::encode(store_id.trim())
        );
        let url = self.join(&path, STREAMED_LIST_OBJECTS_OPERATION)?;
        let request =
            ApiRequest::new(STREAMED_LIST_OBJECTS_OPERATION, Method::POST, url).json(&body)?;
        self.stream(request, options, on_item, on_error).await
    }

    /// Start a request to an arbitrary endpoint.
    ///
    /// `path` is a template: `{name}` placeholders are filled from
    /// [`RawRequest::path_param`], and `{store_id}` falls back to the
    /// configured store.
    pub fn request(&self, method: Method, path: impl Into<String>) -> RawRequest<'_> {
        RawRequest {
            client: self,
            method,
            path: path.into(),
            path_params: BTreeMap::new(),
            query_params: BTreeMap::new(),
            headers: Vec::new(),
            body: RawBody::Empty,
        }
    }

    async fn send_prepared(
        &self,
        request: &mut ApiRequest,
        options: &RequestOptions,
    ) -> Result<HttpResponse, FgaError> {
        let params = self.config.retry_params(options)?;
        let defaults = self.config.request_headers(options)?;
        let headers = request.headers_mut();
        for (name, value) in &defaults {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
        self.orchestrator
            .attempt(request, &params, &self.authorizer)
            .await
    }

    fn join(&self, path: &str, operation: &str) -> Result<Url, FgaError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}"))
            .map_err(|_| FgaError::invalid_parameter("path", operation))
    }
}

fn uses_plain_http(config: &Configuration) -> Result<bool, FgaError> {
    if config.parsed_api_url()?.scheme() == "http" {
        return Ok(true);
    }
    match config.credentials.client_credentials() {
        Some(cc) => Ok(resolve_token_endpoint(&cc.api_token_issuer)?.scheme() == "http"),
        None => Ok(false),
    }
}

fn transport_error(request: &ApiRequest, source: HttpError) -> FgaError {
    FgaError::transport(request.operation(), source)
}

fn decode_json<T: DeserializeOwned>(operation: &str, body: &[u8]) -> Result<T, FgaError> {
    let body = body.trim_ascii();
    let body = if body.is_empty() { b"null".as_slice() } else { body };
    serde_json::from_slice(body).map_err(|source| FgaError::Decode {
        operation: operation.to_owned(),
        source,
    })
}

enum RawBody {
    Empty,
    Json(Value),
    Text(String),
    Invalid(serde_json::Error),
}

/// A request to any endpoint, built from a path template.
///
/// Its operation name is `apiExecutor:<METHOD>:<template>`.
#[must_use]
pub struct RawRequest<'a> {
    client: &'a ApiClient,
    method: Method,
    path: String,
    path_params: BTreeMap<String, String>,
    query_params: BTreeMap<String, String>,
    headers: Vec<(String, String)>,
    body: RawBody,
}

impl std::fmt::Debug for RawRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("path_params", &self.path_params)
            .field("query_params", &self.query_params)
            .finish_non_exhaustive()
    }
}

impl RawRequest<'_> {
    /// Fill `{name}` in the path template. The value is percent-encoded.
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// Query parameters are sent sorted by key.
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// JSON body. Serialization errors surface from [`build`](Self::build).
    pub fn body_json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.body = match serde_json::to_value(value) {
            Ok(value) => RawBody::Json(value),
            Err(err) => RawBody::Invalid(err),
        };
        self
    }

    /// Body sent as-is.
    pub fn body_string(mut self, body: impl Into<String>) -> Self {
        self.body = RawBody::Text(body.into());
        self
    }

    #[must_use]
    pub fn operation(&self) -> String {
        format!("apiExecutor:{}:{}", self.method, self.path)
    }

    /// Resolve the template and assemble the [`ApiRequest`].
    ///
    /// # Errors
    /// `InvalidParameter` for a blank path, an unfilled placeholder or an
    /// invalid header; `Encode` if the JSON body failed to serialize.
    pub fn build(self) -> Result<ApiRequest, FgaError> {
        let operation = self.operation();
        assert_param_exists(Some(self.path.as_str()), "path", &operation)?;

        let mut path = self.path.trim().to_owned();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        for (name, value) in &self.path_params {
            path = path.replace(&format!("{{{name}}}"), &urlencoding::encode(value));
        }
        if path.contains("{store_id}")
            && let Some(store_id) = self.client.config.store_id.as_deref()
            && !store_id.trim().is_empty()
        {
            path = path.replace("{store_id}", &urlencoding::encode(store_id.trim()));
        }
        if let Some(name) = unresolved_placeholder(&path) {
            return Err(FgaError::invalid_parameter(name, operation));
        }

        let mut url = self.client.join(&path, &operation)?;
        if !self.query_params.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query_params);
        }

        let mut request = ApiRequest::new(operation.clone(), self.method, url);
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| FgaError::invalid_parameter("headers", &operation))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| FgaError::invalid_parameter("headers", &operation))?;
            request.headers_mut().insert(name, value);
        }

        match self.body {
            RawBody::Empty => Ok(request),
            RawBody::Json(value) => request.json(&value),
            RawBody::Text(text) => {
                if !request.headers().contains_key(CONTENT_TYPE) {
                    request.headers_mut().insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("text/plain; charset=utf-8"),
                    );
                }
                Ok(request.body(Bytes::from(text)))
            }
            RawBody::Invalid(source) => Err(FgaError::Encode {
                operation,
                source: HttpError::Json(source),
            }),
        }
    }

    /// # Errors
    /// As [`build`](Self::build) and [`ApiClient::attempt`].
    pub async fn send(self, options: &RequestOptions) -> Result<HttpResponse, FgaError> {
        let client = self.client;
        client.attempt(self.build()?, options).await
    }

    /// # Errors
    /// As [`build`](Self::build) and [`ApiClient::send_json`].
    pub async fn send_json<T: DeserializeOwned>(
        self,
        options: &RequestOptions,
    ) -> Result<T, FgaError> {
        let client = self.client;
        client.send_json(self.build()?, options).await
    }

    /// # Errors
    /// As [`send`](Self::send), plus `Transport` if the body cannot be read.
    pub async fn send_text(self, options: &RequestOptions) -> Result<String, FgaError> {
        let client = self.client;
        let mut request = self.build()?;
        let response = client.send_prepared(&mut request, options).await?;
        response
            .text()
            .await
            .map_err(|source| transport_error(&request, source))
    }
}

fn unresolved_placeholder(path: &str) -> Option<&str> {
    let start = path.find('{')?;
    let rest = &path[start + 1..];
    let end = rest.find('}')?;
    Some(&rest[..end])
}
