//! Backoff strategy
//!
//! Exponential schedule from `backon`, randomized with ±jitter, with
//! cancellation support via tokio `CancellationToken` and a status
//! callback for progress reporting.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::RetryError;
use super::classifier::RetryClassifiable;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single wait, including rate-limit waits
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Random variation applied to scheduled delays (0.25 → ±25%)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    500
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_jitter_factor() -> f64 {
    0.25
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Un-jittered delays before attempts 2..=max_attempts
    pub fn backoff_schedule(&self) -> ExponentialBackoff {
        let retries = self.max_attempts.saturating_sub(1) as usize;
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.initial_backoff_ms))
            .with_max_delay(self.max_backoff())
            .with_factor(self.backoff_multiplier as f32)
            .with_max_times(retries)
            .build()
    }
}

/// Retry status for progress callbacks
#[derive(Debug, Clone)]
pub struct RetryStatus {
    /// Attempt that just failed (1-indexed)
    pub attempt: u32,
    /// Total elapsed time since the first attempt
    pub elapsed: Duration,
    /// Wait before the next attempt
    pub sleep: Duration,
    pub reason: String,
    /// True if this is a rate-limit wait (vs scheduled backoff)
    pub is_rate_limit: bool,
}

/// Final outcome of a retried operation
#[derive(Debug)]
pub struct RetryReport<T, E> {
    pub attempts: u32,
    /// First attempt start to resolution, including backoff waits
    pub elapsed: Duration,
    pub outcome: Result<T, RetryError<E>>,
}

/// Execute `operation` with classified retry and cancellation.
///
/// The first attempt always runs. Cancellation is observed before each
/// retry and while sleeping; it never interrupts an attempt in flight.
/// `operation` receives the 1-indexed attempt number.
pub async fn execute_with_backoff_cancellable<F, Fut, T, E, StatusCb>(
    mut operation: F,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut status_cb: StatusCb,
) -> RetryReport<T, E>
where
    F: FnMut(u32) -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    E: std::fmt::Display + RetryClassifiable + Send,
    StatusCb: FnMut(RetryStatus) + Send,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut schedule = policy.backoff_schedule();
    let mut attempt: u32 = 0;

    let outcome = loop {
        attempt = attempt.saturating_add(1);
        let err = match operation(attempt).await {
            Ok(value) => break Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            break Err(RetryError::Permanent(err));
        }
        if attempt >= max_attempts {
            break Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }
        if cancel.is_cancelled() {
            break Err(RetryError::Aborted {
                attempts: attempt,
                last: err,
            });
        }

        let (sleep, is_rate_limit) = match err.suggested_backoff() {
            Some(suggested) => (suggested.min(policy.max_backoff()), true),
            None => {
                let scheduled = schedule.next().unwrap_or_else(|| policy.max_backoff());
                (apply_jitter(scheduled, policy.jitter_factor), false)
            }
        };

        status_cb(RetryStatus {
            attempt,
            elapsed: start.elapsed(),
            sleep,
            reason: err.to_string(),
            is_rate_limit,
        });

        if wait_with_cancel(cancel, sleep).await.is_err() {
            break Err(RetryError::Aborted {
                attempts: attempt,
                last: err,
            });
        }
    };

    RetryReport {
        attempts: attempt,
        elapsed: start.elapsed(),
        outcome,
    }
}

async fn wait_with_cancel(cancel: &CancellationToken, duration: Duration) -> Result<(), ()> {
    if duration.is_zero() {
        return Ok(());
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = cancel.cancelled() => Err(()),
    }
}

/// Adds random variation (±jitter_factor) to prevent thundering herd.
/// Example: 100ms with 0.25 jitter → 75ms to 125ms
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if !jitter_factor.is_finite() || jitter_factor <= 0.0 {
        return duration;
    }
    let factor = jitter_factor.min(1.0);
    let jitter = rand::rng().random_range(-factor..=factor);
    let jittered_ms = (duration.as_millis() as f64 * (1.0 + jitter)).max(0.0) as u64;
    Duration::from_millis(jittered_ms)
}
