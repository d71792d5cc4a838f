use crate::error::HttpError;
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Response, StatusCode};
use http_body_util::{BodyDataStream, BodyExt, Full};
use serde::de::DeserializeOwned;

/// Boxed response body; already decompressed when the server sent
/// `Content-Encoding`.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Unbounded stream of body chunks, see [`HttpResponse::into_data_stream`].
pub type BodyStream = BodyDataStream<ResponseBody>;

/// Response of a single attempt, whatever its status.
///
/// Buffered reads (`bytes`, `json`, `text`) enforce `max_body_size`.
/// Status checks are the caller's job.
#[derive(Debug)]
pub struct HttpResponse {
    inner: Response<ResponseBody>,
    max_body_size: usize,
}

impl HttpResponse {
    #[must_use]
    pub fn new(inner: Response<ResponseBody>, max_body_size: usize) -> Self {
        Self {
            inner,
            max_body_size,
        }
    }

    /// Build a fully buffered response. Used by in-memory transports.
    #[must_use]
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: ResponseBody = Full::new(body.into())
            .map_err(|never| match never {})
            .boxed();
        let mut inner = Response::new(body);
        *inner.status_mut() = status;
        *inner.headers_mut() = headers;
        Self::new(inner, usize::MAX)
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Header value as `&str`, `None` when absent or not visible ASCII.
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name)?.to_str().ok()
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    #[must_use]
    pub fn into_inner(self) -> Response<ResponseBody> {
        self.inner
    }

    /// Read the whole body.
    ///
    /// # Errors
    /// `BodyTooLarge` past `max_body_size`, `Transport` if the body stream fails.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_body_limited(self.inner.into_body(), self.max_body_size).await
    }

    /// Read at most `limit` bytes and drop the rest. Never fails on size,
    /// which makes it suitable for error bodies of unknown length.
    ///
    /// # Errors
    /// `Transport` if the body stream fails before `limit` bytes arrive.
    pub async fn bytes_preview(self, limit: usize) -> Result<Bytes, HttpError> {
        let mut body = std::pin::pin!(self.inner.into_body());
        let mut collected = BytesMut::new();

        while collected.len() < limit {
            let Some(frame) = body.frame().await else {
                break;
            };
            let frame = frame.map_err(HttpError::Transport)?;
            if let Some(chunk) = frame.data_ref() {
                let take = chunk.len().min(limit - collected.len());
                collected.extend_from_slice(&chunk[..take]);
            }
        }

        Ok(collected.freeze())
    }

    /// Decode the whole body as JSON.
    ///
    /// # Errors
    /// Same as [`bytes`](Self::bytes), plus `Json` on malformed content.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let body = self.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Read the whole body as UTF-8, replacing invalid sequences.
    ///
    /// # Errors
    /// Same as [`bytes`](Self::bytes).
    pub async fn text(self) -> Result<String, HttpError> {
        let body = self.bytes().await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Body as a stream of chunks for incremental processing.
    ///
    /// `max_body_size` is **not** enforced: streaming endpoints may send an
    /// unbounded number of lines. Consumers must bound what they buffer.
    #[must_use]
    pub fn into_data_stream(self) -> BodyStream {
        self.inner.into_body().into_data_stream()
    }
}

async fn read_body_limited(body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut body = std::pin::pin!(body);
    let mut collected = BytesMut::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            let actual = collected.len() + chunk.len();
            if actual > limit {
                return Err(HttpError::BodyTooLarge { limit, actual });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(collected.freeze())
}
