//! Bounded retry with exponential backoff
//!
//! Shared by every fetch strategy and by the downloader, so that retry
//! behaviour is defined once. Failures are classified into a [`FailureKind`]
//! and the [`RetryPolicy`] decides whether another attempt is worthwhile.
//!
//! ```text
//! delay(attempt) = min(base * 2^(attempt-1), max) + jitter
//! ```

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Classification of a failed attempt for retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// May succeed on retry: timeouts, connection resets, 5xx, 408
    Transient,
    /// Will not succeed on retry: 4xx, confirmed content mismatch, local I/O
    Permanent,
    /// HTTP 429; retried with backoff
    RateLimited,
}

/// Decision on whether to retry a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`; `attempt` is the 1-indexed number of the next attempt
    Retry { delay: Duration, attempt: u32 },
    /// Give up
    DoNotRetry { reason: String },
}

/// Retry configuration with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` counts the initial attempt and is at least 1
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        max_jitter: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            max_jitter,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            Duration::from_millis(config.jitter_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        if kind == FailureKind::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            tracing::debug!(
                "Max attempts reached ({} of {})",
                attempt,
                self.max_attempts
            );
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.delay_for(attempt);
        tracing::debug!(
            "Attempt {} failed ({:?}), retrying in {}ms",
            attempt,
            kind,
            delay.as_millis()
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Backoff before the attempt that follows `attempt`, jitter included
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_backoff(attempt) + self.jitter()
    }

    /// Backoff without jitter
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = self.base_delay.as_millis() as f64 * BACKOFF_MULTIPLIER.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Classifies an HTTP status code
///
/// | Status | Kind |
/// |--------|------|
/// | 408 | Transient |
/// | 429 | RateLimited |
/// | other 4xx | Permanent |
/// | 5xx | Transient |
/// | anything else unexpected | Permanent |
pub fn classify_status(status: u16) -> FailureKind {
    match status {
        408 => FailureKind::Transient,
        429 => FailureKind::RateLimited,
        400..=499 => FailureKind::Permanent,
        500..=599 => FailureKind::Transient,
        _ => FailureKind::Permanent,
    }
}

/// Classifies a transport-level reqwest error
pub fn classify_reqwest_error(error: &reqwest::Error) -> FailureKind {
    if let Some(status) = error.status() {
        return classify_status(status.as_u16());
    }
    if error.is_builder() || error.is_redirect() {
        return FailureKind::Permanent;
    }
    FailureKind::Transient
}
