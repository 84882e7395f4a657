//! Agent collaborator contract
//!
//! Baseline and variant are interchangeable implementations of `Agent`;
//! the engine only ever sees `Arc<dyn Agent>`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::{ErrorClass, RetryClassifiable};
use crate::types::{AgentResponse, ErrorKind, Question};

/// Retry-eligible agent failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransientError {
    #[error("Invocation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

/// Failures that retrying cannot fix
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermanentError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Request rejected: {0}")]
    Rejected(String),
}

/// Classified failure of a single agent invocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error(transparent)]
    Transient(#[from] TransientError),

    #[error(transparent)]
    Permanent(#[from] PermanentError),
}

impl AgentError {
    pub fn timeout(after: Duration) -> Self {
        TransientError::Timeout(after).into()
    }

    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        TransientError::RateLimited { retry_after }.into()
    }

    pub fn connection(message: impl Into<String>) -> Self {
        TransientError::Connection(message.into()).into()
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        TransientError::Unavailable(message.into()).into()
    }

    pub fn malformed_request(message: impl Into<String>) -> Self {
        PermanentError::MalformedRequest(message.into()).into()
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        PermanentError::Authentication(message.into()).into()
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        PermanentError::Rejected(message.into()).into()
    }

    /// Kind recorded on the trial when this error is final
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Transient(TransientError::Timeout(_)) => ErrorKind::Timeout,
            AgentError::Transient(TransientError::RateLimited { .. }) => ErrorKind::RateLimited,
            AgentError::Transient(TransientError::Connection(_)) => ErrorKind::Connection,
            AgentError::Transient(TransientError::Unavailable(_)) => ErrorKind::Unavailable,
            AgentError::Permanent(PermanentError::MalformedRequest(_)) => {
                ErrorKind::MalformedRequest
            }
            AgentError::Permanent(PermanentError::Authentication(_)) => ErrorKind::Authentication,
            AgentError::Permanent(PermanentError::Rejected(_)) => ErrorKind::Rejected,
        }
    }
}

impl RetryClassifiable for AgentError {
    fn classify(&self) -> ErrorClass {
        match self {
            AgentError::Transient(_) => ErrorClass::Transient,
            AgentError::Permanent(_) => ErrorClass::Permanent,
        }
    }

    fn suggested_backoff(&self) -> Option<Duration> {
        match self {
            AgentError::Transient(TransientError::RateLimited { retry_after }) => *retry_after,
            _ => None,
        }
    }
}

/// Typed answer from an agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    pub response_text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub model_name: String,
}

/// What an agent hands back on success
#[derive(Debug, Clone, PartialEq)]
pub enum RawAgentOutput {
    Reply(AgentReply),
    /// Loosely keyed output; normalized by `metrics::normalize`
    Json(serde_json::Value),
}

impl From<AgentReply> for RawAgentOutput {
    fn from(reply: AgentReply) -> Self {
        RawAgentOutput::Reply(reply)
    }
}

impl From<serde_json::Value> for RawAgentOutput {
    fn from(value: serde_json::Value) -> Self {
        RawAgentOutput::Json(value)
    }
}

/// An answer-generating agent under comparison
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, question_text: &str) -> Result<RawAgentOutput, AgentError>;

    /// Tokens of grounding material this agent is handed
    fn context_tokens(&self) -> u64 {
        0
    }
}

/// Baseline and variant agents compared by a run
#[derive(Clone)]
pub struct AgentPair {
    pub baseline: Arc<dyn Agent>,
    pub variant: Arc<dyn Agent>,
}

impl AgentPair {
    pub fn new(baseline: Arc<dyn Agent>, variant: Arc<dyn Agent>) -> Self {
        Self { baseline, variant }
    }
}

impl std::fmt::Debug for AgentPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentPair")
            .field("baseline", &self.baseline.name())
            .field("variant", &self.variant.name())
            .finish()
    }
}

#[derive(Debug, Clone, Error)]
#[error("Scorer failed: {0}")]
pub struct ScorerError(pub String);

/// Optional judge of a paired trial.
///
/// The returned value is stored verbatim in `TestResult::judgement`; the
/// harness never interprets it.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn judge(
        &self,
        question: &Question,
        baseline: &AgentResponse,
        variant: &AgentResponse,
    ) -> Result<serde_json::Value, ScorerError>;
}
