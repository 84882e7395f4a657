//! Core data model for paired agent trials
//!
//! A `SuiteRun` owns one `TestResult` per question, each pairing the
//! baseline and variant `AgentResponse` to byte-identical question text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::suite::SelectionPolicy;

/// Version tag written into every persisted `SuiteRun`
pub const SCHEMA_VERSION: u32 = 1;

/// Question categories (fixed set of seven)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Factual,
    Procedural,
    Conceptual,
    Comparative,
    Troubleshooting,
    CodeGeneration,
    OutOfScope,
}

impl Category {
    /// Canonical name for storage/comparison
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Procedural => "procedural",
            Self::Conceptual => "conceptual",
            Self::Comparative => "comparative",
            Self::Troubleshooting => "troubleshooting",
            Self::CodeGeneration => "code_generation",
            Self::OutOfScope => "out_of_scope",
        }
    }

    /// Parse from string (case-insensitive, `-` and spaces accepted for `_`)
    pub fn from_string(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::all().into_iter().find(|c| c.as_str() == normalized)
    }

    /// All categories in canonical order
    pub fn all() -> [Self; 7] {
        [
            Self::Factual,
            Self::Procedural,
            Self::Conceptual,
            Self::Comparative,
            Self::Troubleshooting,
            Self::CodeGeneration,
            Self::OutOfScope,
        ]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single question; immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub category: Category,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            category,
        }
    }
}

/// Globally unique run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Fresh random (v4) identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classified reason a response failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimited,
    Connection,
    Unavailable,
    MalformedRequest,
    Authentication,
    Rejected,
    /// Agent output could not be normalized
    ParseFailure,
    /// Run cancelled before a retry could be attempted
    Cancelled,
    /// Agent task panicked or another harness-side failure
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::Connection => "connection",
            Self::Unavailable => "unavailable",
            Self::MalformedRequest => "malformed_request",
            Self::Authentication => "authentication",
            Self::Rejected => "rejected",
            Self::ParseFailure => "parse_failure",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }

    /// Whether this kind comes from a retry-eligible failure
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::RateLimited | Self::Connection | Self::Unavailable
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final status of an agent invocation, after retries resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error { kind: ErrorKind, message: String },
}

impl ResponseStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ok => None,
            Self::Error { kind, .. } => Some(*kind),
        }
    }
}

/// Normalized result of one agent on one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub response_text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Wall clock from the first attempt start to final resolution,
    /// including every retry and backoff delay
    pub latency_ms: u64,
    pub model_name: String,
    /// Invocation attempts made (1 when the first attempt resolved it)
    pub attempts: u32,
    pub status: ResponseStatus,
}

impl AgentResponse {
    /// Failed response with empty text and zero token counts
    pub fn failed(
        kind: ErrorKind,
        message: impl Into<String>,
        latency_ms: u64,
        attempts: u32,
    ) -> Self {
        Self {
            response_text: String::new(),
            prompt_tokens: 0,
            completion_tokens: 0,
            latency_ms,
            model_name: String::new(),
            attempts,
            status: ResponseStatus::Error {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// Baseline and variant responses to the same question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub question_id: String,
    pub baseline: AgentResponse,
    pub variant: AgentResponse,
    /// Size of the grounding material handed to the variant
    pub context_tokens: u64,
    /// Dispatch time of the trial
    pub timestamp: DateTime<Utc>,
    /// Opaque output of an optional pluggable scorer. A stored `null` is a
    /// judgement; only an absent field means no scorer ran.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub judgement: Option<serde_json::Value>,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}

impl TestResult {
    /// `variant.prompt_tokens - baseline.prompt_tokens`
    pub fn token_overhead(&self) -> i64 {
        signed_diff(self.variant.prompt_tokens, self.baseline.prompt_tokens)
    }

    /// `variant.latency_ms - baseline.latency_ms`
    pub fn latency_diff_ms(&self) -> i64 {
        signed_diff(self.variant.latency_ms, self.baseline.latency_ms)
    }

    /// Both sides resolved successfully
    pub fn both_ok(&self) -> bool {
        self.baseline.is_ok() && self.variant.is_ok()
    }
}

fn signed_diff(a: u64, b: u64) -> i64 {
    let diff = i128::from(a) - i128::from(b);
    i64::try_from(diff).unwrap_or(if diff < 0 { i64::MIN } else { i64::MAX })
}

/// Description of the suite a run executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteMetadata {
    pub name: String,
    pub selection: SelectionPolicy,
    pub question_count: usize,
    pub baseline_agent: String,
    pub variant_agent: String,
    pub concurrency_limit: usize,
    pub max_attempts: u32,
    pub timeout_ms: u64,
}

/// How far a run got
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunCompletion {
    InProgress,
    Complete,
    /// Cancellation stopped scheduling after `dispatched` of `total` trials
    Cancelled { dispatched: usize, total: usize },
    /// Unrecoverable storage failure stopped the run
    Aborted { reason: String },
}

/// A suite execution and its ordered results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteRun {
    pub schema_version: u32,
    pub run_id: RunId,
    pub suite: SuiteMetadata,
    /// Results in input question order
    pub results: Vec<TestResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub completion: RunCompletion,
}

impl SuiteRun {
    /// Empty in-progress run
    pub fn begin(run_id: RunId, suite: SuiteMetadata, started_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            run_id,
            suite,
            results: Vec::new(),
            started_at,
            finished_at: None,
            completion: RunCompletion::InProgress,
        }
    }

    /// Every question produced a result
    pub fn is_complete(&self) -> bool {
        self.completion == RunCompletion::Complete
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn result_for(&self, question_id: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.question_id == question_id)
    }

    /// Results where either side failed
    pub fn failed_trials(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| !r.both_ok())
    }
}
