//! The retry loop around a single logical call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fga_http::security::ERROR_BODY_PREVIEW_LIMIT;
use fga_http::{HttpError, HttpResponse, HttpTransport};
use http::{HeaderMap, HeaderValue, StatusCode};
use tokio::time::Instant;

use crate::auth::Authorizer;
use crate::error::{ApiError, FgaError, classify_failure};
use crate::request::ApiRequest;
use crate::retry::{
    DEFAULT_MAX_RETRIES, DEFAULT_MIN_RETRY_DELAY, calculate_delay, retry_after_from_headers,
    should_retry,
};
use crate::telemetry::{
    Attribute, Attributes, MODEL_ID_HEADER, Metric, NoOpTelemetry, QUERY_DURATION_HEADER,
    TelemetrySink,
};

/// Attempt budget and backoff base of one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryParams {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub minimum_retry_delay: Duration,
}

impl Default for RetryParams {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            minimum_retry_delay: DEFAULT_MIN_RETRY_DELAY,
        }
    }
}

enum Next {
    Retry { delay: Duration, error: FgaError },
    Stop(FgaError),
}

/// Drives attempts of an [`ApiRequest`] until success, a non-retryable
/// failure or the attempt budget runs out.
///
/// Cheap to clone; the transport and telemetry sink are shared.
#[derive(Clone)]
pub struct Orchestrator {
    transport: Arc<dyn HttpTransport>,
    telemetry: Arc<dyn TelemetrySink>,
    client_id: Option<String>,
    audience: Option<String>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("client_id", &self.client_id)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            telemetry: Arc::new(NoOpTelemetry),
            client_id: None,
            audience: None,
        }
    }

    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Client id and audience copied into errors and telemetry.
    #[must_use]
    pub fn with_client_identity(mut self, client_id: String, audience: Option<String>) -> Self {
        self.client_id = Some(client_id);
        self.audience = audience;
        self
    }

    /// Run `request` with an `Authorization` header from `authorizer`,
    /// refreshed before every attempt.
    ///
    /// # Errors
    /// The classified error of the last attempt, a transport error when no
    /// response was received, or any error from obtaining the token.
    pub async fn attempt(
        &self,
        request: &ApiRequest,
        params: &RetryParams,
        authorizer: &Authorizer,
    ) -> Result<HttpResponse, FgaError> {
        self.run(request, params, || authorizer.authorization(self))
            .await
    }

    /// Run `request` without authentication (token exchange).
    ///
    /// # Errors
    /// Same as [`attempt`](Self::attempt).
    pub async fn attempt_unauthenticated(
        &self,
        request: &ApiRequest,
        params: &RetryParams,
    ) -> Result<HttpResponse, FgaError> {
        self.run(request, params, || std::future::ready(Ok(None)))
            .await
    }

    pub(crate) fn record_credentials_request(&self) {
        let mut attributes = Attributes::new();
        if let Some(client_id) = &self.client_id {
            attributes.insert(Attribute::RequestClientId, client_id.clone());
        }
        self.telemetry
            .record_counter(Metric::CredentialsRequest, 1, &attributes);
    }

    async fn run<F, Fut>(
        &self,
        request: &ApiRequest,
        params: &RetryParams,
        authorize: F,
    ) -> Result<HttpResponse, FgaError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Option<HeaderValue>, FgaError>>,
    {
        let started = Instant::now();
        let mut previous: Option<FgaError> = None;
        let mut attempt: u32 = 0;

        loop {
            let authorization = authorize().await?;
            let sent = self
                .transport
                .send(request.to_http(attempt, authorization)?)
                .await;

            let next = match sent {
                Ok(response) if response.status().is_success() => {
                    self.record_request(
                        request,
                        attempt,
                        Some(response.status()),
                        Some(response.headers()),
                        started,
                    );
                    return Ok(response);
                }
                Ok(response) => {
                    self.on_failed_response(request, params, attempt, response, previous.take())
                        .await
                }
                Err(err) => {
                    Self::on_transport_error(request, params, attempt, err, previous.take())
                }
            };

            match next {
                Next::Retry { delay, error } => {
                    previous = Some(error);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Next::Stop(error) => {
                    let api = error.api_error();
                    self.record_request(
                        request,
                        attempt,
                        api.map(ApiError::status),
                        api.map(ApiError::headers),
                        started,
                    );
                    return Err(error);
                }
            }
        }
    }

    async fn on_failed_response(
        &self,
        request: &ApiRequest,
        params: &RetryParams,
        attempt: u32,
        response: HttpResponse,
        previous: Option<FgaError>,
    ) -> Next {
        let status = response.status();
        let headers = response.headers().clone();
        let body = match response.bytes_preview(ERROR_BODY_PREVIEW_LIMIT).await {
            Ok(body) => body,
            Err(err) => {
                tracing::debug!(error = %err, status = status.as_u16(), "Failed to read error response body");
                Bytes::new()
            }
        };

        let mut error = classify_failure(request, status, &headers, &body, previous);
        error.client_id.clone_from(&self.client_id);
        error.audience.clone_from(&self.audience);

        if !should_retry(status.as_u16()) || attempt >= params.max_retries {
            return Next::Stop(error.into());
        }

        let server_delay = retry_after_from_headers(&headers);
        let delay = calculate_delay(server_delay, attempt, Some(params.minimum_retry_delay));

        tracing::debug!(
            retry = attempt + 1,
            max_retries = params.max_retries,
            status = status.as_u16(),
            operation = request.operation(),
            method = %request.method(),
            host = request.url().host_str().unwrap_or_default(),
            request_id = ?error.request_id(),
            backoff_ms = delay.as_millis(),
            retry_after_used = server_delay.is_some(),
            "Retrying request after status code"
        );

        Next::Retry {
            delay,
            error: error.into(),
        }
    }

    fn on_transport_error(
        request: &ApiRequest,
        params: &RetryParams,
        attempt: u32,
        err: HttpError,
        previous: Option<FgaError>,
    ) -> Next {
        let retryable = err.is_retryable() && attempt < params.max_retries;
        let delay = calculate_delay(None, attempt, Some(params.minimum_retry_delay));

        if retryable {
            tracing::debug!(
                retry = attempt + 1,
                max_retries = params.max_retries,
                error = %err,
                operation = request.operation(),
                method = %request.method(),
                host = request.url().host_str().unwrap_or_default(),
                backoff_ms = delay.as_millis(),
                "Retrying request after error"
            );
        }

        let error = FgaError::Transport {
            operation: request.operation().to_owned(),
            source: err,
            previous: previous.map(Box::new),
        };
        if retryable {
            Next::Retry { delay, error }
        } else {
            Next::Stop(error)
        }
    }

    fn record_request(
        &self,
        request: &ApiRequest,
        attempt: u32,
        status: Option<StatusCode>,
        headers: Option<&HeaderMap>,
        started: Instant,
    ) {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::RequestMethod, request.operation().to_owned());
        attributes.insert(Attribute::RequestRetries, attempt.to_string());
        attributes.insert(Attribute::HttpMethod, request.method().to_string());
        if let Some(host) = request.url().host_str() {
            attributes.insert(Attribute::HttpHost, host.to_owned());
        }
        if let Some(client_id) = &self.client_id {
            attributes.insert(Attribute::RequestClientId, client_id.clone());
        }
        if let Some(status) = status {
            attributes.insert(Attribute::HttpStatusCode, status.as_u16().to_string());
        }
        let header = |name: &str| headers?.get(name)?.to_str().ok().map(str::trim);
        if let Some(model_id) = header(MODEL_ID_HEADER) {
            attributes.insert(Attribute::ResponseModelId, model_id.to_owned());
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.telemetry
            .record_histogram(Metric::RequestDuration, elapsed_ms, &attributes);

        if let Some(query_ms) = header(QUERY_DURATION_HEADER).and_then(|v| v.parse::<f64>().ok()) {
            self.telemetry
                .record_histogram(Metric::QueryDuration, query_ms, &attributes);
        }
    }
}
