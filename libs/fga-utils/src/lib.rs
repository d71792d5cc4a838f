#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Small building blocks shared by the OpenFGA client crates.
//!
//! - [`SecretString`] keeps client secrets and bearer tokens out of logs.
//! - [`duration_serde`] reads durations written either as humantime strings
//!   (`"250ms"`, `"10s"`) or as whole milliseconds.

pub mod secret_string;

#[cfg(feature = "serde")]
pub mod duration_serde;

pub use secret_string::SecretString;
