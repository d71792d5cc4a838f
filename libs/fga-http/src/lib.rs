#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP transport for the OpenFGA client.
//!
//! A hyper-based client that sends exactly one attempt per call:
//! - TLS via rustls (HTTPS only unless plain HTTP is explicitly allowed)
//! - Connection pooling with a connect timeout
//! - Per-attempt request timeout
//! - `User-Agent` and default header injection (never overriding caller headers)
//! - Transparent response decompression (gzip, brotli, deflate)
//!
//! Retries, token handling and error classification live in `fga-sdk`,
//! which talks to this crate only through the [`HttpTransport`] trait.
//!
//! # Example
//!
//! ```ignore
//! use bytes::Bytes;
//! use fga_http::{HttpClient, HttpClientConfig, HttpTransport};
//!
//! let client = HttpClient::with_config(HttpClientConfig::default())?;
//! let request = http::Request::get("https://api.fga.example/stores")
//!     .body(Bytes::new())?;
//! let response = client.send(request).await?;
//! let body = response.bytes().await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;
pub mod security;
mod tls;
mod transport;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{DEFAULT_USER_AGENT, HttpClientConfig, TlsRootConfig, TransportSecurity};
pub use error::{HttpError, InvalidUriKind};
pub use layers::{DefaultHeadersLayer, DefaultHeadersService};
pub use response::{BodyStream, HttpResponse, ResponseBody};
pub use transport::HttpTransport;
