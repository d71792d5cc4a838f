//! NDJSON streaming responses.
//!
//! Every line is decoded on its own into a [`StreamLineResult`]; a bad line
//! becomes a per-line error and decoding carries on with the next one.
//! Only a failure of the body stream itself ends the stream early.

use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::BytesMut;
use fga_http::security::ERROR_BODY_PREVIEW_LIMIT;
use fga_http::{BodyStream, HttpError, HttpResponse};
use futures::{Stream, StreamExt};
use pin_project_lite::pin_project;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::error::{FgaError, classify_failure};
use crate::request::ApiRequest;

/// Longest line accepted; longer lines become [`StreamLineError::LineTooLong`].
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Outcome of one line.
#[derive(Debug)]
pub enum StreamLineResult<T> {
    Result(T),
    Error(StreamLineError),
}

/// Error object sent in place of a result: `{"error":{"code":5,"message":"..."}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "code {}", self.code)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Why a single line did not produce a result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamLineError {
    /// The server reported an error for this entry.
    #[error("Stream error: {0}")]
    Status(StreamStatus),

    #[error("line {line}: malformed stream entry: {source}")]
    Decode {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: longer than {limit} bytes")]
    LineTooLong { line: u64, limit: usize },

    #[error("line {line}: not valid UTF-8")]
    InvalidUtf8 { line: u64 },
}

#[derive(Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct WireLine<T> {
    result: Option<T>,
    error: Option<StreamStatus>,
}

fn parse_line<T: DeserializeOwned>(line: &str, number: u64) -> StreamLineResult<T> {
    let decoded = serde_json::from_str::<WireLine<T>>(line);
    match decoded {
        Ok(WireLine {
            result: Some(item), ..
        }) => StreamLineResult::Result(item),
        Ok(WireLine {
            error: Some(status),
            ..
        }) => StreamLineResult::Error(StreamLineError::Status(status)),
        Ok(_) => {
            tracing::warn!(line = number, "Stream entry has neither result nor error");
            StreamLineResult::Error(StreamLineError::Decode {
                line: number,
                source: serde::de::Error::custom("entry has neither `result` nor `error`"),
            })
        }
        Err(source) => {
            tracing::warn!(line = number, "Failed to decode stream entry");
            StreamLineResult::Error(StreamLineError::Decode {
                line: number,
                source,
            })
        }
    }
}

pin_project! {
    /// Pull-based view of an NDJSON body.
    ///
    /// Yields `Ok(StreamLineResult)` per non-blank line in order. An `Err` is
    /// terminal: the body stream failed and no more lines will follow.
    pub struct NdjsonStream<T> {
        #[pin]
        body: BodyStream,
        buffer: BytesMut,
        codec: LinesCodec,
        line: u64,
        eof: bool,
        done: bool,
        marker: PhantomData<fn() -> T>,
    }
}

impl<T> NdjsonStream<T> {
    /// Stream the body of `response`. The status is not checked.
    #[must_use]
    pub fn new(response: HttpResponse) -> Self {
        Self::from_body(response.into_data_stream())
    }

    #[must_use]
    pub fn from_body(body: BodyStream) -> Self {
        Self {
            body,
            buffer: BytesMut::new(),
            codec: LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
            line: 0,
            eof: false,
            done: false,
            marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for NdjsonStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdjsonStream")
            .field("line", &self.line)
            .field("buffered", &self.buffer.len())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<T: DeserializeOwned> Stream for NdjsonStream<T> {
    type Item = Result<StreamLineResult<T>, HttpError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if *this.done {
                return Poll::Ready(None);
            }

            let decoded = if *this.eof {
                this.codec.decode_eof(this.buffer)
            } else {
                this.codec.decode(this.buffer)
            };

            match decoded {
                Ok(Some(line)) => {
                    *this.line += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Poll::Ready(Some(Ok(parse_line(&line, *this.line))));
                }
                Ok(None) if *this.eof => {
                    *this.done = true;
                    return Poll::Ready(None);
                }
                Ok(None) => {}
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    *this.line += 1;
                    tracing::warn!(line = *this.line, limit = MAX_LINE_LENGTH, "Stream line too long");
                    return Poll::Ready(Some(Ok(StreamLineResult::Error(
                        StreamLineError::LineTooLong {
                            line: *this.line,
                            limit: MAX_LINE_LENGTH,
                        },
                    ))));
                }
                Err(LinesCodecError::Io(_)) => {
                    *this.line += 1;
                    tracing::warn!(line = *this.line, "Stream line is not valid UTF-8");
                    return Poll::Ready(Some(Ok(StreamLineResult::Error(
                        StreamLineError::InvalidUtf8 { line: *this.line },
                    ))));
                }
            }

            match ready!(this.body.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => this.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(HttpError::Transport(err))));
                }
                None => *this.eof = true,
            }
        }
    }
}

/// Feed every line of a streaming response to `on_item` or `on_error`, in order.
///
/// A non-2xx `response` fails the whole call with a classified error before
/// any line is read. Per-line errors go to `on_error` and decoding continues;
/// the call returns once the body is exhausted.
///
/// # Errors
/// The classified error for a non-2xx status, or `Transport` if the body
/// stream breaks (that failure is not passed to `on_error`).
pub async fn decode_stream<T, I, E>(
    request: &ApiRequest,
    response: HttpResponse,
    mut on_item: I,
    mut on_error: E,
) -> Result<(), FgaError>
where
    T: DeserializeOwned,
    I: FnMut(T),
    E: FnMut(StreamLineError),
{
    let status = response.status();
    if !status.is_success() {
        let headers = response.headers().clone();
        let body = response
            .bytes_preview(ERROR_BODY_PREVIEW_LIMIT)
            .await
            .unwrap_or_default();
        return Err(classify_failure(request, status, &headers, &body, None).into());
    }

    let mut lines = NdjsonStream::<T>::new(response);
    while let Some(next) = lines.next().await {
        let line = next.map_err(|source| FgaError::transport(request.operation(), source))?;
        match line {
            StreamLineResult::Result(item) => on_item(item),
            StreamLineResult::Error(err) => on_error(err),
        }
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fga_http::ResponseBody;
    use http::{HeaderMap, Method, Response, StatusCode};
    use http_body::Frame;
    use http_body_util::{BodyExt, StreamBody};
    use serde_json::Value;
    use tracing_test::traced_test;
    use url::Url;

    type BoxError = Box<dyn std::error::Error + Send + Sync>;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        object: String,
    }

    fn request() -> ApiRequest {
        ApiRequest::new(
            "streamedListObjects",
            Method::POST,
            Url::parse("https://api.fga.example/stores/01H/streamed-list-objects").unwrap(),
        )
    }

    fn chunked(chunks: Vec<Result<&'static str, &'static str>>) -> HttpResponse {
        let frames = chunks.into_iter().map(|c| match c {
            Ok(data) => Ok::<_, BoxError>(Frame::data(Bytes::from_static(data.as_bytes()))),
            Err(msg) => Err(BoxError::from(msg)),
        });
        let body: ResponseBody = BodyExt::boxed(StreamBody::new(futures::stream::iter(frames)));
        HttpResponse::new(Response::new(body), 16)
    }

    async fn collect(response: HttpResponse) -> (Vec<Item>, Vec<StreamLineError>, Result<(), FgaError>) {
        let mut items = Vec::new();
        let mut errors = Vec::new();
        let outcome = decode_stream(&request(), response, |i| items.push(i), |e| errors.push(e)).await;
        (items, errors, outcome)
    }

    #[tokio::test]
    #[traced_test]
    async fn malformed_line_does_not_stop_the_stream() {
        let body = concat!(
            r#"{"result":{"object":"document:1"}}"#,
            "\n",
            r#"{"error":{"code":"oops","message":5}}"#,
            "\n",
            r#"{"result":{"object":"document:3"}}"#,
            "\n",
        );
        let response = HttpResponse::from_bytes(StatusCode::OK, HeaderMap::new(), body);

        let (items, errors, outcome) = collect(response).await;

        outcome.unwrap();
        assert_eq!(
            items,
            vec![
                Item { object: "document:1".into() },
                Item { object: "document:3".into() }
            ]
        );
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], StreamLineError::Decode { line: 2, .. }));
        assert!(logs_contain("Failed to decode stream entry"));
        assert!(!logs_contain("oops"));
    }

    #[tokio::test]
    async fn error_entries_go_to_error_sink() {
        let body = concat!(
            r#"{"error":{"code":4,"message":"deadline exceeded"}}"#,
            "\n",
            r#"{"error":{"code":13}}"#,
            "\n",
        );
        let response = HttpResponse::from_bytes(StatusCode::OK, HeaderMap::new(), body);
        let (items, errors, outcome) = collect(response).await;

        outcome.unwrap();
        assert!(items.is_empty());
        assert_eq!(errors[0].to_string(), "Stream error: deadline exceeded");
        assert_eq!(errors[1].to_string(), "Stream error: code 13");
    }

    #[tokio::test]
    async fn lines_split_across_chunks_and_blank_lines() {
        let response = chunked(vec![
            Ok("{\"result\":{\"obj"),
            Ok("ect\":\"a\"}}\n\n  \n{\"result\""),
            Ok(":{\"object\":\"b\"}}"),
        ]);
        let (items, errors, outcome) = collect(response).await;

        outcome.unwrap();
        assert!(errors.is_empty());
        assert_eq!(items, vec![Item { object: "a".into() }, Item { object: "b".into() }]);
    }

    #[tokio::test]
    async fn line_without_result_or_error_is_reported() {
        let response = HttpResponse::from_bytes(StatusCode::OK, HeaderMap::new(), "{}\n");
        let (_, errors, outcome) = collect(response).await;
        outcome.unwrap();
        assert!(matches!(errors[0], StreamLineError::Decode { line: 1, .. }));
    }

    #[tokio::test]
    async fn oversized_line_is_skipped() {
        let long = format!("{{\"result\":{{\"object\":\"{}\"}}}}\n", "x".repeat(MAX_LINE_LENGTH));
        let body = format!("{long}{{\"result\":{{\"object\":\"ok\"}}}}\n");
        let response = HttpResponse::from_bytes(StatusCode::OK, HeaderMap::new(), body);
        let (items, errors, outcome) = collect(response).await;

        outcome.unwrap();
        assert!(matches!(errors[0], StreamLineError::LineTooLong { line: 1, .. }));
        assert_eq!(items, vec![Item { object: "ok".into() }]);
    }

    #[tokio::test]
    async fn body_failure_is_terminal_and_not_sent_to_sink() {
        let response = chunked(vec![
            Ok("{\"result\":{\"object\":\"a\"}}\n"),
            Err("connection reset"),
            Ok("{\"result\":{\"object\":\"never\"}}\n"),
        ]);
        let (items, errors, outcome) = collect(response).await;

        assert_eq!(items, vec![Item { object: "a".into() }]);
        assert!(errors.is_empty());
        assert!(matches!(outcome, Err(FgaError::Transport { .. })));
    }

    #[tokio::test]
    async fn non_success_status_fails_before_reading_lines() {
        let response = HttpResponse::from_bytes(
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            r#"{"code":"store_id_not_found","message":"store not found"}"#,
        );
        let (items, errors, outcome) = collect(response).await;

        assert!(items.is_empty() && errors.is_empty());
        let err = outcome.unwrap_err();
        assert!(err.api_error().unwrap().is_not_found_error());
        assert_eq!(
            err.to_string(),
            "[streamedListObjects] store not found (store_id_not_found)"
        );
    }

    #[tokio::test]
    async fn pull_form_yields_in_order() {
        let response = HttpResponse::from_bytes(
            StatusCode::OK,
            HeaderMap::new(),
            "{\"result\":1}\nnot json\n{\"result\":3}",
        );
        let outcomes: Vec<_> = NdjsonStream::<Value>::new(response)
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(&outcomes[0], StreamLineResult::Result(v) if v == 1));
        assert!(matches!(&outcomes[1], StreamLineResult::Error(StreamLineError::Decode { line: 2, .. })));
        assert!(matches!(&outcomes[2], StreamLineResult::Result(v) if v == 3));
    }
}
