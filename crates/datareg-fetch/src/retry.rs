use std::time::Duration;

use datareg_core::FetchSettings;

use crate::error::FetchError;

/// Result of one attempt, consumed by [`run_with_retry`].
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Done(T),
    /// Transient failure; the string is logged and kept as the final reason.
    Retry(String),
    Fatal(FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&FetchSettings::default())
    }
}

impl From<&FetchSettings> for RetryPolicy {
    fn from(settings: &FetchSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_backoff: settings.base_backoff,
        }
    }
}

/// Delay before retry number `retry_count` (0 = first retry): `base * 2^retry_count`.
pub fn retry_delay(retry_count: u32, base: Duration) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(retry_count))
}

/// How a non-success HTTP status should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    Retryable,
    Fatal,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        408 | 429 => StatusClass::Retryable,
        500..=599 => StatusClass::Retryable,
        _ => StatusClass::Fatal,
    }
}

/// Run `attempt` until it is done, fatal, or the policy's attempt ceiling is reached.
///
/// `attempt` receives the 1-based attempt number. `sleep` is injected so the
/// loop can be tested without waiting.
pub fn run_with_retry<T>(
    policy: &RetryPolicy,
    url: &str,
    mut attempt: impl FnMut(u32) -> AttemptOutcome<T>,
    mut sleep: impl FnMut(Duration),
) -> Result<T, FetchError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut last_reason = String::new();

    for n in 1..=max_attempts {
        match attempt(n) {
            AttemptOutcome::Done(value) => return Ok(value),
            AttemptOutcome::Fatal(err) => {
                tracing::debug!(url, attempt = n, error = %err, "non-retryable failure");
                return Err(err);
            }
            AttemptOutcome::Retry(reason) => {
                if n < max_attempts {
                    let delay = retry_delay(n - 1, policy.base_backoff);
                    tracing::warn!(
                        url,
                        attempt = n,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "transient failure, retrying"
                    );
                    sleep(delay);
                } else {
                    tracing::warn!(url, attempt = n, reason = %reason, "retry budget exhausted");
                }
                last_reason = reason;
            }
        }
    }

    Err(FetchError::Network {
        url: url.to_string(),
        attempts: max_attempts,
        reason: last_reason,
    })
}
