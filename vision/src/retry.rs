//! Retry policy with exponential backoff, gated by the circuit breaker.
//!
//! # Retry Policy
//!
//! - Max retries: 2 (3 total attempts) for identifier extraction
//! - Initial delay: 2 seconds, doubling per retry
//! - Max delay: 8 seconds
//! - Completions use [`RetryConfig::none`]: a single attempt
//!
//! # Failure Handling
//!
//! - Permission failures disable the breaker permanently, no retry
//! - Rate limits trip the shared cooldown, no retry
//! - Retryable failures (408, 409, 5xx, connection errors) back off and retry
//! - Everything else surfaces immediately
//!
//! The breaker is re-checked before every attempt, so a cooldown tripped by
//! another caller while this one is backing off ends the loop.

use std::future::Future;
use std::time::Duration;

use reqwest::header::HeaderMap;

use crate::breaker::CircuitBreaker;
use crate::error::{DisableReason, VisionError};

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting initial request).
    pub max_retries: u32,
    /// Initial backoff delay before first retry.
    pub initial_delay: Duration,
    /// Maximum backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// Single attempt, no backoff.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// How a single attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    PermissionDenied { status: u16 },
    RateLimited,
    Retryable,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Server-provided delay hint for the next attempt.
    pub retry_after: Option<Duration>,
}

impl AttemptFailure {
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

/// Parse `Retry-After` or `Retry-After-Ms` headers.
///
/// Returns `Some(duration)` if a valid value is found and `0 < duration < 60s`.
/// Returns `None` if headers are missing, invalid, or out of range.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    // Try Retry-After-Ms first (milliseconds, float)
    if let Some(val) = headers.get("retry-after-ms")
        && let Ok(s) = val.to_str()
        && let Ok(ms) = s.parse::<f64>()
        && ms.is_finite()
        && ms > 0.0
    {
        let duration = Duration::from_secs_f64(ms / 1000.0);
        if duration < Duration::from_secs(60) {
            return Some(duration);
        }
    }

    // Try Retry-After (seconds, integer)
    if let Some(val) = headers.get("retry-after")
        && let Ok(s) = val.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        let duration = Duration::from_secs(secs);
        if duration > Duration::ZERO && duration < Duration::from_secs(60) {
            return Some(duration);
        }
    }

    None
}

/// Calculate retry delay with exponential backoff.
///
/// - `backoff_step`: 0 before first retry, 1 before second, etc.
/// - A server `Retry-After` hint wins over the computed backoff.
#[must_use]
pub fn calculate_retry_delay(
    backoff_step: u32,
    config: &RetryConfig,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(delay) = retry_after {
        return delay;
    }

    // Exponential backoff: initial_delay * 2^backoff_step
    let factor = 1u32.checked_shl(backoff_step).unwrap_or(u32::MAX);
    config
        .initial_delay
        .saturating_mul(factor)
        .min(config.max_delay)
}

/// Run `attempt` under the breaker and retry policy.
///
/// `attempt` receives the zero-based retry count. `cooldown` is the window
/// applied to the shared breaker when the service signals a rate limit.
pub async fn run_with_retry<T, F, Fut>(
    config: &RetryConfig,
    breaker: &CircuitBreaker,
    cooldown: Duration,
    mut attempt: F,
) -> Result<T, VisionError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptFailure>>,
{
    let mut retry_count = 0;
    loop {
        breaker.check()?;

        let failure = match attempt(retry_count).await {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };

        match failure.kind {
            FailureKind::PermissionDenied { status } => {
                breaker.disable(DisableReason::PermissionDenied { status });
                return Err(VisionError::PermissionDenied { status });
            }
            FailureKind::RateLimited => {
                breaker.trip_cooldown(cooldown);
                return Err(VisionError::RateLimited {
                    cooldown_secs: cooldown.as_secs(),
                });
            }
            FailureKind::Retryable if retry_count < config.max_retries => {
                let delay = calculate_retry_delay(retry_count, config, failure.retry_after);
                tracing::debug!(
                    error = %failure.message,
                    retry_count = retry_count + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying vision request"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            FailureKind::Retryable | FailureKind::Fatal => {
                return Err(VisionError::Transient {
                    message: failure.message,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::ManualClock;
    use reqwest::header::HeaderValue;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    const COOLDOWN: Duration = Duration::from_secs(45);

    #[test]
    fn test_parse_retry_after_ms() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after-ms", HeaderValue::from_static("1500"));
        assert_eq!(
            parse_retry_after(&headers),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("5"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_retry_after_out_of_range() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("120"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.clear();
        headers.insert("retry-after", HeaderValue::from_static("0"));
        assert_eq!(parse_retry_after(&headers), None);

        headers.clear();
        headers.insert("retry-after-ms", HeaderValue::from_static("NaN"));
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_backoff_doubles_from_two_seconds() {
        let config = RetryConfig::default();
        assert_eq!(calculate_retry_delay(0, &config, None), Duration::from_secs(2));
        assert_eq!(calculate_retry_delay(1, &config, None), Duration::from_secs(4));
        assert_eq!(calculate_retry_delay(2, &config, None), Duration::from_secs(8));
        // Capped
        assert_eq!(calculate_retry_delay(5, &config, None), Duration::from_secs(8));
        assert_eq!(calculate_retry_delay(40, &config, None), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_after_hint_wins() {
        let config = RetryConfig::default();
        let delay = calculate_retry_delay(0, &config, Some(Duration::from_secs(3)));
        assert_eq!(delay, Duration::from_secs(3));
    }

    fn retryable() -> AttemptFailure {
        AttemptFailure::new(FailureKind::Retryable, "HTTP 503")
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_twice_with_backoff_then_surfaces() {
        let breaker = CircuitBreaker::new();
        let attempts = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result: Result<(), _> =
            run_with_retry(&RetryConfig::default(), &breaker, COOLDOWN, |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(retryable()) }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(
            result,
            Err(VisionError::Transient {
                message: "HTTP 503".to_string()
            })
        );
        // 2s + 4s of backoff
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(7), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let breaker = CircuitBreaker::new();
        let result = run_with_retry(&RetryConfig::default(), &breaker, COOLDOWN, |n| async move {
            if n == 0 { Err(retryable()) } else { Ok(n) }
        })
        .await;
        assert_eq!(result, Ok(1));
    }

    #[tokio::test]
    async fn test_zero_retries_is_single_attempt() {
        let breaker = CircuitBreaker::new();
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = run_with_retry(&RetryConfig::none(), &breaker, COOLDOWN, |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(retryable()) }
        })
        .await;
        assert!(matches!(result, Err(VisionError::Transient { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_trips_cooldown_without_retry() {
        let clock = Arc::new(ManualClock::new());
        let breaker = CircuitBreaker::with_clock(clock.clone());
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> =
            run_with_retry(&RetryConfig::default(), &breaker, COOLDOWN, |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptFailure::new(FailureKind::RateLimited, "HTTP 429")) }
            })
            .await;

        assert_eq!(result, Err(VisionError::RateLimited { cooldown_secs: 45 }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(breaker.cooldown_remaining(), 45);

        // Next call fails fast without running the attempt.
        clock.advance(Duration::from_secs(5));
        let result: Result<(), _> =
            run_with_retry(&RetryConfig::default(), &breaker, COOLDOWN, |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert_eq!(result, Err(VisionError::Cooldown { remaining_secs: 40 }));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permission_failure_disables_breaker() {
        let breaker = CircuitBreaker::new();
        let result: Result<(), _> =
            run_with_retry(&RetryConfig::default(), &breaker, COOLDOWN, |_| async {
                Err(AttemptFailure::new(
                    FailureKind::PermissionDenied { status: 403 },
                    "HTTP 403",
                ))
            })
            .await;
        assert_eq!(result, Err(VisionError::PermissionDenied { status: 403 }));
        assert!(breaker.is_disabled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_tripped_during_backoff_stops_retries() {
        let breaker = CircuitBreaker::new();
        let attempts = AtomicU32::new(0);

        let result: Result<(), _> =
            run_with_retry(&RetryConfig::default(), &breaker, COOLDOWN, |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                // Another caller hits the rate limit while this one backs off.
                breaker.trip_cooldown(COOLDOWN);
                async { Err(retryable()) }
            })
            .await;

        assert!(matches!(result, Err(VisionError::Cooldown { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let breaker = CircuitBreaker::new();
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> =
            run_with_retry(&RetryConfig::default(), &breaker, COOLDOWN, |_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(AttemptFailure::new(FailureKind::Fatal, "HTTP 400")) }
            })
            .await;
        assert!(matches!(result, Err(VisionError::Transient { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
