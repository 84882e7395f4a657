//! Per-run context threaded through execution, analysis and persistence
//!
//! Created when a run begins and dropped when it ends. Holds the run's
//! identity, a tracing span every component logs under, and the
//! run-scoped cancellation signal.

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::types::RunId;

#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: RunId,
    label: String,
    span: Span,
    cancel: CancellationToken,
}

impl RunContext {
    /// New context with a fresh run id
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_run_id(RunId::new(), label)
    }

    pub fn with_run_id(run_id: RunId, label: impl Into<String>) -> Self {
        let label = label.into();
        let span = tracing::info_span!("abeval.run", run_id = %run_id, label = %label);
        Self {
            run_id,
            label,
            span,
            cancel: CancellationToken::new(),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Stop scheduling new invocations; in-flight ones run to completion
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_get_distinct_run_ids() {
        let a = RunContext::new("smoke");
        let b = RunContext::new("smoke");
        assert_ne!(a.run_id(), b.run_id());
        assert_eq!(a.label(), "smoke");
    }

    #[test]
    fn test_cancel_is_shared_by_clones() {
        let ctx = RunContext::new("cancel");
        let clone = ctx.clone();
        assert!(!clone.is_cancelled());
        ctx.cancel();
        assert!(clone.is_cancelled());
        assert!(clone.cancellation_token().is_cancelled());
    }
}
