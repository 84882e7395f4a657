//! Error classification for retry decisions

use std::time::Duration;

/// Top-level error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry with backoff
    Transient,
    /// Do NOT retry
    Permanent,
}

/// Trait for error classification
pub trait RetryClassifiable {
    fn classify(&self) -> ErrorClass;

    fn is_retryable(&self) -> bool {
        self.classify() == ErrorClass::Transient
    }

    /// Wait requested by the remote side, overriding the backoff schedule
    fn suggested_backoff(&self) -> Option<Duration> {
        None
    }
}
