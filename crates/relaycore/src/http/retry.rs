//! Retry/backoff policy for the HTTP Client Facade, grounded in the
//! original's curl-session retry loop: exponential backoff with jitter,
//! a forced-retry status code list, and dual-form `Retry-After` parsing
//! (integer seconds or an HTTP-date).

use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::config::RetryPolicyConfig;
use crate::utils::generate_jitter_percent;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
    pub retryable_status_codes: Vec<u16>,
    pub retryable_methods: Vec<String>,
}

impl From<&RetryPolicyConfig> for RetryPolicy {
    fn from(cfg: &RetryPolicyConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            backoff_multiplier: cfg.backoff_multiplier,
            max_backoff: Duration::from_secs(cfg.max_backoff_secs),
            retryable_status_codes: cfg.retryable_status_codes.iter().filter_map(|s| s.parse().ok()).collect(),
            retryable_methods: cfg.retryable_methods.clone(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryPolicyConfig::default())
    }
}

impl RetryPolicy {
    pub fn allows_method(&self, method: &reqwest::Method) -> bool {
        self.retryable_methods.iter().any(|m| m.eq_ignore_ascii_case(method.as_str()))
    }

    pub fn should_retry_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// Delay before the next attempt (1-indexed): honors `Retry-After` if
    /// present, otherwise `backoff_multiplier^(attempt-1)` seconds with
    /// +/-10% jitter, capped at `max_backoff`.
    pub fn delay_for_attempt(&self, attempt: u32, response_headers: Option<&HeaderMap>) -> Duration {
        if let Some(headers) = response_headers {
            if let Some(delay) = parse_retry_after(headers) {
                return delay.min(self.max_backoff);
            }
        }

        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = (self.backoff_multiplier.powi(attempt as i32 - 1) * 1000.0) as u64;
        let jitter_ms = generate_jitter_percent(base_ms, 10);
        Duration::from_millis(base_ms + jitter_ms).min(self.max_backoff)
    }
}

/// Parses `Retry-After` as either an integer seconds count or an HTTP-date,
/// matching the original's dual-form handling.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;

    if let Ok(secs) = raw.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let retry_at = chrono::DateTime::parse_from_rfc2822(raw.trim()).ok()?;
    let now = chrono::Utc::now();
    let delta = retry_at.with_timezone(&chrono::Utc) - now;
    delta.to_std().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_without_retry_after() {
        let policy = RetryPolicy { backoff_multiplier: 2.0, max_backoff: Duration::from_secs(100), ..RetryPolicy::default() };
        let d1 = policy.delay_for_attempt(1, None);
        let d2 = policy.delay_for_attempt(2, None);
        assert!(d2 >= d1);
    }

    #[test]
    fn delay_capped_at_max_backoff() {
        let policy = RetryPolicy { backoff_multiplier: 10.0, max_backoff: Duration::from_secs(1), ..RetryPolicy::default() };
        let d = policy.delay_for_attempt(10, None);
        assert!(d <= Duration::from_secs(1));
    }

    #[test]
    fn first_attempt_has_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0, None), Duration::ZERO);
    }

    #[test]
    fn retryable_status_codes_match_config_default() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry_status(503));
        assert!(!policy.should_retry_status(404));
    }

    #[test]
    fn retry_after_integer_seconds_is_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "5".parse().unwrap());
        let delay = parse_retry_after(&headers).unwrap();
        assert_eq!(delay, Duration::from_secs(5));
    }
}
