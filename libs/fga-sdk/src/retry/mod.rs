//! When to retry and how long to wait.

mod after;
mod strategy;

pub use after::{
    MAX_RETRY_AFTER, MIN_RETRY_AFTER, parse_retry_after, parse_retry_after_at,
    retry_after_from_headers,
};
pub use strategy::{
    DEFAULT_MAX_RETRIES, DEFAULT_MIN_RETRY_DELAY, MAX_RETRIES_LIMIT, MIN_SERVER_DELAY,
    RetryContext, calculate_delay, calculate_delay_with, should_retry,
};
