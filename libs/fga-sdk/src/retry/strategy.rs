use std::time::Duration;

use rand::Rng;

/// Backoff base when no minimum retry delay is configured.
pub const DEFAULT_MIN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound accepted for `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 15;

/// Floor for server-provided delays.
pub const MIN_SERVER_DELAY: Duration = Duration::from_millis(1);

/// Whether a response with this status is worth another attempt.
///
/// `429` and every `5xx` except `501 Not Implemented`. Method and
/// idempotency do not matter; the caller bounds the attempt count.
#[must_use]
pub fn should_retry(status: u16) -> bool {
    status == 429 || ((500..600).contains(&status) && status != 501)
}

/// Delay before the next attempt.
///
/// A server delay wins (floored at 1ms). Otherwise exponential backoff
/// `base * 2^attempt` plus uniform jitter in `[0, base)`.
#[must_use]
pub fn calculate_delay(
    server_delay: Option<Duration>,
    attempt: u32,
    minimum_retry_delay: Option<Duration>,
) -> Duration {
    calculate_delay_with(&mut rand::rng(), server_delay, attempt, minimum_retry_delay)
}

/// [`calculate_delay`] with a caller-supplied random source.
#[must_use]
pub fn calculate_delay_with<R: Rng + ?Sized>(
    rng: &mut R,
    server_delay: Option<Duration>,
    attempt: u32,
    minimum_retry_delay: Option<Duration>,
) -> Duration {
    if let Some(delay) = server_delay {
        return delay.max(MIN_SERVER_DELAY);
    }

    let base = minimum_retry_delay
        .filter(|d| !d.is_zero())
        .unwrap_or(DEFAULT_MIN_RETRY_DELAY);

    let exponential = base.saturating_mul(2u32.saturating_pow(attempt));
    let base_nanos = u64::try_from(base.as_nanos()).unwrap_or(u64::MAX);
    let jitter = Duration::from_nanos(rng.random_range(0..base_nanos));

    exponential.saturating_add(jitter)
}

/// Per-call retry state: which attempt failed and what the server asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryContext {
    /// 0-based number of the attempt that just failed.
    pub attempt: u32,
    pub minimum_retry_delay: Option<Duration>,
    pub server_delay: Option<Duration>,
}

impl RetryContext {
    #[must_use]
    pub fn new(attempt: u32, minimum_retry_delay: Option<Duration>) -> Self {
        Self {
            attempt,
            minimum_retry_delay,
            server_delay: None,
        }
    }

    #[must_use]
    pub fn with_server_delay(mut self, server_delay: Option<Duration>) -> Self {
        self.server_delay = server_delay;
        self
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        calculate_delay(self.server_delay, self.attempt, self.minimum_retry_delay)
    }
}
