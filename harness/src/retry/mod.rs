//! Retry logic with exponential backoff
//!
//! Provides:
//! - Error classification (transient vs permanent)
//! - Exponential backoff schedule with jitter
//! - Attempt limit (total attempts, including the first)
//! - Server-suggested waits for rate limits
//! - Cancellation between attempts and during backoff

pub mod classifier;
pub mod strategy;

pub use classifier::{ErrorClass, RetryClassifiable};
pub use strategy::{RetryPolicy, RetryReport, RetryStatus, execute_with_backoff_cancellable};

/// Why a retried operation gave up. Every variant keeps the last error.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("Permanent error (not retried): {0}")]
    Permanent(E),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("Retry aborted by cancellation after {attempts} attempts: {last}")]
    Aborted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Permanent(last)
            | RetryError::Exhausted { last, .. }
            | RetryError::Aborted { last, .. } => last,
        }
    }

    pub fn into_last_error(self) -> E {
        match self {
            RetryError::Permanent(last)
            | RetryError::Exhausted { last, .. }
            | RetryError::Aborted { last, .. } => last,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, RetryError::Aborted { .. })
    }
}
