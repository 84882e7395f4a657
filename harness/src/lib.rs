//! A/B comparison harness for answer-generating agents
//!
//! Runs a baseline and a variant agent against an identical, ordered set of
//! questions and decides whether their cost and latency differ.
//!
//! Pipeline:
//! - `QuestionBank` loads questions, `SuiteBuilder` selects an ordered suite
//! - `ExecutionEngine` runs paired trials under bounded concurrency with
//!   per-invocation timeout, classified retry and cancellation
//! - `metrics::normalize` turns raw agent output into an `AgentResponse`
//! - `analysis::aggregate` produces one `StatSummary` per metric
//! - `ResultStore` persists and reloads a `SuiteRun` losslessly
//!
//! Every public call that does work takes a `RunContext`, which carries the
//! run's identity, tracing span and cancellation signal.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod agent;
pub mod analysis;
pub mod bank;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod suite;
pub mod types;

pub use abeval_stats as stats;
pub use abeval_stats::{SignificanceConfig, StatSummary, Verdict};
pub use agent::{
    Agent, AgentError, AgentPair, AgentReply, PermanentError, RawAgentOutput, Scorer,
    ScorerError, TransientError,
};
pub use analysis::{METRICS, aggregate};
pub use bank::QuestionBank;
pub use config::{ConfigLoader, HarnessConfig};
pub use context::RunContext;
pub use engine::{ExecutionEngine, ExecutionPolicy};
pub use error::{BankError, HarnessError, Result};
pub use retry::RetryPolicy;
pub use store::{FileResultStore, PersistOptions, ResultStore, StoreError};
pub use suite::{SelectionPolicy, Suite, SuiteBuilder};
pub use types::{
    AgentResponse, Category, ErrorKind, Question, ResponseStatus, RunCompletion, RunId,
    SCHEMA_VERSION, SuiteMetadata, SuiteRun, TestResult,
};
