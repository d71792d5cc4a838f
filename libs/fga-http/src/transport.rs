use crate::client::HttpClient;
use crate::error::HttpError;
use crate::response::HttpResponse;
use async_trait::async_trait;
use bytes::Bytes;

/// "Send one HTTP request, get status/headers/body back."
///
/// The OpenFGA client depends only on this trait, so tests and embedders can
/// swap in their own transport. Implementations must not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// # Errors
    /// Any failure that prevented a response from being received.
    async fn send(&self, request: http::Request<Bytes>) -> Result<HttpResponse, HttpError>;
}

#[async_trait]
impl HttpTransport for HttpClient {
    async fn send(&self, request: http::Request<Bytes>) -> Result<HttpResponse, HttpError> {
        self.execute(request).await
    }
}
