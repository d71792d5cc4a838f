//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fga_http::{HttpError, HttpResponse, HttpTransport};
use http::{HeaderMap, HeaderValue, Method, StatusCode};

pub(crate) enum Step {
    Respond {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: String,
    },
    Fail(HttpError),
}

impl Step {
    pub(crate) fn status(status: u16, body: &str) -> Self {
        Self::Respond {
            status,
            headers: Vec::new(),
            body: body.to_owned(),
        }
    }

    pub(crate) fn with_header(self, name: &'static str, value: &str) -> Self {
        match self {
            Self::Respond {
                status,
                mut headers,
                body,
            } => {
                headers.push((name, value.to_owned()));
                Self::Respond {
                    status,
                    headers,
                    body,
                }
            }
            fail @ Self::Fail(_) => fail,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Replays `Step`s in order and records every request it sees.
pub(crate) struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Recorded>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub(crate) fn new(steps: Vec<Step>) -> Arc<Self> {
        Self::with_latency(steps, Duration::ZERO)
    }

    pub(crate) fn with_latency(steps: Vec<Step>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: Mutex::new(Vec::new()),
            latency,
        })
    }

    pub(crate) fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: http::Request<Bytes>) -> Result<HttpResponse, HttpError> {
        let (parts, body) = request.into_parts();
        self.calls.lock().unwrap().push(Recorded {
            method: parts.method,
            uri: parts.uri.to_string(),
            headers: parts.headers,
            body,
        });
        let step = self.steps.lock().unwrap().pop_front();

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match step.expect("transport script exhausted") {
            Step::Respond {
                status,
                headers,
                body,
            } => {
                let mut map = HeaderMap::new();
                for (name, value) in headers {
                    map.append(name, HeaderValue::from_str(&value).unwrap());
                }
                Ok(HttpResponse::from_bytes(
                    StatusCode::from_u16(status).unwrap(),
                    map,
                    body,
                ))
            }
            Step::Fail(err) => Err(err),
        }
    }
}
