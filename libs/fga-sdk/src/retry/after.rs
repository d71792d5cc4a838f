use std::time::{Duration, SystemTime};

use http::HeaderMap;

/// Smallest server-provided delay we honor.
pub const MIN_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Largest server-provided delay we honor (30 minutes).
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(1800);

/// Parse a `Retry-After` value: integer seconds or an RFC 1123 HTTP-date.
///
/// Anything outside `[1s, 1800s]`, blank or unparseable yields `None`, which
/// tells the caller to fall back to exponential backoff.
#[must_use]
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    parse_retry_after_at(value?, SystemTime::now())
}

/// Same as [`parse_retry_after`] with an explicit clock, for HTTP-date values.
#[must_use]
pub fn parse_retry_after_at(value: &str, now: SystemTime) -> Option<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let delay = if let Ok(seconds) = trimmed.parse::<i64>() {
        if seconds <= 0 {
            return None;
        }
        Duration::from_secs(seconds.cast_unsigned())
    } else {
        let at = httpdate::parse_http_date(trimmed).ok()?;
        // Past dates fail here
        at.duration_since(now).ok()?
    };

    (MIN_RETRY_AFTER..=MAX_RETRY_AFTER)
        .contains(&delay)
        .then_some(delay)
}

/// Read and parse the `Retry-After` header of a response.
#[must_use]
pub fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok();
    parse_retry_after(value)
}
