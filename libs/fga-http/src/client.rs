use crate::builder::HttpClientBuilder;
use crate::config::{HttpClientConfig, TransportSecurity};
use crate::error::HttpError;
use crate::request::validate_uri;
use crate::response::{HttpResponse, ResponseBody};
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use tower::Service;
use tower::buffer::Buffer;

/// Future type of the boxed inner service
pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

/// Buffered service shared by all clones of an [`HttpClient`]
pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// Pooled HTTP client over a tower stack.
///
/// `Clone + Send + Sync`; clones share one connection pool through the
/// internal buffer, so no `Mutex` is needed around it.
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: BufferedService,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
}

impl HttpClient {
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// # Errors
    /// Same as [`HttpClientBuilder::build`].
    pub fn with_config(config: HttpClientConfig) -> Result<Self, HttpError> {
        HttpClientBuilder::with_config(config).build()
    }

    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Send one request. Any HTTP status is `Ok`; `Err` means no response
    /// was received (or the request was rejected before sending).
    ///
    /// # Errors
    /// `InvalidUri`/`InvalidScheme` for URLs the transport refuses,
    /// `Overloaded` when the buffer is full, `Timeout` / `Transport` / `Tls`
    /// for failed attempts.
    pub async fn execute(&self, request: Request<Bytes>) -> Result<HttpResponse, HttpError> {
        validate_uri(request.uri(), self.transport_security)?;

        let request = request.map(Full::new);
        let mut service = self.service.clone();
        try_acquire_buffer_slot(&mut service).await?;

        let inner = service.call(request).await.map_err(map_buffer_error)?;
        Ok(HttpResponse::new(inner, self.max_body_size))
    }
}

/// Map buffer errors to `HttpError`: inner errors pass through, anything
/// else means the buffer worker is gone.
pub fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(
                error = %err,
                "buffer worker closed unexpectedly; service unavailable"
            );
            HttpError::ServiceClosed
        }
    }
}

/// Poll the buffer once; a full buffer fails fast with `Overloaded`.
///
/// # Errors
/// `Overloaded` when full, `ServiceClosed` when the worker is gone.
pub async fn try_acquire_buffer_slot(service: &mut BufferedService) -> Result<(), HttpError> {
    use std::task::Poll;

    let poll_result = std::future::poll_fn(|cx| match service.poll_ready(cx) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await;

    match poll_result {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(map_buffer_error(e)),
        None => Err(HttpError::Overloaded),
    }
}
