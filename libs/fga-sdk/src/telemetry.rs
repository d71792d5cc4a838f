//! Telemetry hooks.
//!
//! The client reports through a [`TelemetrySink`]; exporting to a metrics
//! backend is the embedder's job. [`NoOpTelemetry`] is the default and
//! [`TracingTelemetry`] writes every measurement as a `debug` event.

use std::collections::BTreeMap;

/// Response header with the server-side query time in milliseconds.
pub const QUERY_DURATION_HEADER: &str = "fga-query-duration-ms";

/// Response header with the authorization model the server evaluated.
pub const MODEL_ID_HEADER: &str = "openfga-authorization-model-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    /// Counter: successful client-credentials exchanges.
    CredentialsRequest,
    /// Histogram (ms): whole logical call, retries included.
    RequestDuration,
    /// Histogram (ms): server-reported query time.
    QueryDuration,
}

impl Metric {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::CredentialsRequest => "fga-client.credentials.request",
            Self::RequestDuration => "fga-client.request.duration",
            Self::QueryDuration => "fga-client.query.duration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attribute {
    /// Operation name, e.g. `check` or `exchangeToken`.
    RequestMethod,
    /// Retries performed (attempts minus one).
    RequestRetries,
    RequestClientId,
    ResponseModelId,
    HttpHost,
    HttpMethod,
    HttpStatusCode,
}

impl Attribute {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::RequestMethod => "fga-client.request.method",
            Self::RequestRetries => "fga-client.request.retries",
            Self::RequestClientId => "fga-client.request.client_id",
            Self::ResponseModelId => "fga-client.response.model_id",
            Self::HttpHost => "http.host",
            Self::HttpMethod => "http.method",
            Self::HttpStatusCode => "http.status_code",
        }
    }
}

pub type Attributes = BTreeMap<Attribute, String>;

/// Receiver of client measurements. Calls are fire-and-forget and must not block.
pub trait TelemetrySink: Send + Sync {
    fn record_counter(&self, metric: Metric, value: u64, attributes: &Attributes);

    fn record_histogram(&self, metric: Metric, value: f64, attributes: &Attributes);
}

/// Discards everything (default).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTelemetry;

impl TelemetrySink for NoOpTelemetry {
    fn record_counter(&self, _metric: Metric, _value: u64, _attributes: &Attributes) {}

    fn record_histogram(&self, _metric: Metric, _value: f64, _attributes: &Attributes) {}
}

/// Logs measurements through `tracing` (for debugging).
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    fn render(attributes: &Attributes) -> String {
        attributes
            .iter()
            .map(|(k, v)| format!("{}={v}", k.name()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl TelemetrySink for TracingTelemetry {
    fn record_counter(&self, metric: Metric, value: u64, attributes: &Attributes) {
        tracing::debug!(
            metric = metric.name(),
            value,
            attributes = %Self::render(attributes),
            "Telemetry counter recorded"
        );
    }

    fn record_histogram(&self, metric: Metric, value: f64, attributes: &Attributes) {
        tracing::debug!(
            metric = metric.name(),
            value,
            attributes = %Self::render(attributes),
            "Telemetry histogram recorded"
        );
    }
}
