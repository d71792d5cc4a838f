#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Reliability core of the OpenFGA client.
//!
//! - [`retry`]: `Retry-After` parsing, retryable statuses, jittered backoff
//! - [`error`]: classification of failed responses into [`ApiError`]
//! - [`auth`]: OAuth2 client-credentials token cache with single-flight refresh
//! - [`stream`]: NDJSON decoding for streaming endpoints
//! - [`attempt`]: the retry loop around one logical call
//! - [`client`]: [`ApiClient`], the raw request builder and `streamed_list_objects`
//!
//! Transport is supplied by `fga-http` through [`fga_http::HttpTransport`].
//!
//! # Example
//!
//! ```ignore
//! use fga_sdk::{ApiClient, Configuration, RequestOptions, StreamedListObjectsResponse};
//!
//! let client = ApiClient::new(Configuration::load(None)?)?;
//! client
//!     .streamed_list_objects(
//!         "01HSTORE",
//!         &serde_json::json!({"type": "document", "relation": "viewer", "user": "user:anne"}),
//!         |item: StreamedListObjectsResponse| tracing::info!(object = %item.object),
//!         |err| tracing::warn!(error = %err),
//!         &RequestOptions::default(),
//!     )
//!     .await?;
//! ```

pub mod attempt;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod retry;
pub mod stream;
pub mod telemetry;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use attempt::{Orchestrator, RetryParams};
pub use auth::{AccessToken, AccessTokenCache, Authorizer};
pub use client::{ApiClient, RawRequest, StreamedListObjectsResponse};
pub use config::{ClientCredentials, Configuration, Credentials, RequestOptions};
pub use error::{ApiError, ErrorKind, FgaError, ValidationDetails, classify};
pub use request::ApiRequest;
pub use stream::{NdjsonStream, StreamLineError, StreamLineResult, StreamStatus, decode_stream};
pub use telemetry::{NoOpTelemetry, TelemetrySink, TracingTelemetry};
pub use validation::assert_param_exists;

pub use fga_utils::SecretString;
