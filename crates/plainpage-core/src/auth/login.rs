use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::models::User;

/// Wait assumed when a 429 response carries no usable `Retry-After` header
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Result of a login attempt that reached the server.
///
/// Wrong credentials and rate limiting are expected outcomes the UI renders
/// inline, so they are values here rather than errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    LoggedIn(User),
    InvalidCredentials,
    RateLimited { retry_after: Duration },
}

impl LoginOutcome {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, LoginOutcome::LoggedIn(_))
    }
}

/// Read the server's `Retry-After` hint, given in whole seconds
pub(crate) fn retry_after(headers: &HeaderMap) -> Duration {
    let secs = headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("42"));
        assert_eq!(retry_after(&headers), Duration::from_secs(42));
    }

    #[test]
    fn test_retry_after_defaults() {
        assert_eq!(retry_after(&HeaderMap::new()), Duration::from_secs(1));

        // HTTP-date form is not used by the server
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), Duration::from_secs(1));
    }
}
