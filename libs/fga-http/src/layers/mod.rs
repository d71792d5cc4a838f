//! Tower layers used by the transport stack.
//!
//! - [`DefaultHeadersLayer`] - fills in `User-Agent` and configured default
//!   headers that the request does not already carry

mod default_headers;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
