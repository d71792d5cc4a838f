use std::time::{Duration, SystemTime};

use fga_utils::SecretString;
use rand::Rng;

/// Safety margin before `expires_at` at which a token stops being used.
pub const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(300);

/// Upper bound of the random extra margin drawn on every validity check.
pub const TOKEN_EXPIRY_JITTER: Duration = Duration::from_secs(300);

/// A bearer token and its absolute expiry. Replaced wholesale on refresh.
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: SecretString,
    expires_at: Option<SystemTime>,
}

impl AccessToken {
    /// `expires_at: None` means the token never expires.
    #[must_use]
    pub fn new(value: SecretString, expires_at: Option<SystemTime>) -> Self {
        Self { value, expires_at }
    }

    /// Token that expires `expires_in` after `now`.
    #[must_use]
    pub fn expiring_in(value: SecretString, now: SystemTime, expires_in: Option<Duration>) -> Self {
        Self::new(value, expires_in.and_then(|d| now.checked_add(d)))
    }

    #[must_use]
    pub fn value(&self) -> &SecretString {
        &self.value
    }

    #[must_use]
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// Usable right now. The jitter is drawn fresh on every call so that
    /// processes sharing credentials do not all refresh at the same moment.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let jitter_nanos = u64::try_from(TOKEN_EXPIRY_JITTER.as_nanos()).unwrap_or(u64::MAX);
        let jitter = Duration::from_nanos(rand::rng().random_range(0..=jitter_nanos));
        self.is_valid_at(SystemTime::now(), jitter)
    }

    /// `now < expires_at - buffer - jitter`; always true without expiry.
    #[must_use]
    pub fn is_valid_at(&self, now: SystemTime, jitter: Duration) -> bool {
        if self.value.is_blank() {
            return false;
        }
        let Some(expires_at) = self.expires_at else {
            return true;
        };
        let margin = TOKEN_EXPIRY_BUFFER.saturating_add(jitter);
        match expires_at.checked_sub(margin) {
            Some(refresh_at) => now < refresh_at,
            None => false,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn minus(t: SystemTime, d: Duration) -> SystemTime {
        t.checked_sub(d).unwrap()
    }

    fn minus_secs(d: Duration, secs: u64) -> Duration {
        d.checked_sub(Duration::from_secs(secs)).unwrap()
    }

    fn token(expires_at: Option<SystemTime>) -> AccessToken {
        AccessToken::new(SecretString::new("tok"), expires_at)
    }

    #[test]
    fn no_expiry_is_always_valid() {
        let t = token(None);
        let far_future = SystemTime::now() + Duration::from_secs(10 * 365 * 24 * 3600);
        assert!(t.is_valid());
        assert!(t.is_valid_at(far_future, TOKEN_EXPIRY_JITTER));
    }

    #[test]
    fn blank_value_is_never_valid() {
        let t = AccessToken::new(SecretString::new(""), None);
        assert!(!t.is_valid());
    }

    #[test]
    fn validity_window_respects_buffer_and_jitter() {
        let now = SystemTime::now();
        let expires_at = now + Duration::from_secs(3600);
        let t = token(Some(expires_at));

        let latest = minus(expires_at, TOKEN_EXPIRY_BUFFER);
        let earliest = minus(latest, TOKEN_EXPIRY_JITTER);

        // Valid before the earliest cut-off whatever the jitter
        let before = minus(earliest, Duration::from_secs(1));
        assert!(t.is_valid_at(before, Duration::ZERO));
        assert!(t.is_valid_at(before, TOKEN_EXPIRY_JITTER));

        // Invalid from the latest cut-off whatever the jitter
        assert!(!t.is_valid_at(latest, Duration::ZERO));
        assert!(!t.is_valid_at(latest, TOKEN_EXPIRY_JITTER));

        // In between it depends on the draw
        let middle = earliest + Duration::from_secs(150);
        assert!(t.is_valid_at(middle, Duration::ZERO));
        assert!(!t.is_valid_at(middle, TOKEN_EXPIRY_JITTER));
    }

    #[test]
    fn random_checks_stay_inside_window() {
        let now = SystemTime::now();
        let fresh = token(Some(now + TOKEN_EXPIRY_BUFFER + TOKEN_EXPIRY_JITTER + Duration::from_secs(60)));
        let stale = token(Some(now + minus_secs(TOKEN_EXPIRY_BUFFER, 1)));
        for _ in 0..100 {
            assert!(fresh.is_valid());
            assert!(!stale.is_valid());
        }
    }

    #[test]
    fn expiring_in_computes_absolute_instant() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let t = AccessToken::expiring_in(SecretString::new("tok"), now, Some(Duration::from_secs(60)));
        assert_eq!(t.expires_at(), Some(now + Duration::from_secs(60)));
        assert!(AccessToken::expiring_in(SecretString::new("tok"), now, None).expires_at().is_none());
    }

    #[test]
    fn debug_hides_value() {
        let rendered = format!("{:?}", token(None));
        assert!(!rendered.contains("tok\""));
        assert!(rendered.contains("[REDACTED]"));
    }
}
