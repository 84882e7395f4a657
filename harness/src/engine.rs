//! ExecutionEngine: paired trials under bounded concurrency
//!
//! One schedulable unit per question: both agents are invoked concurrently
//! with byte-identical text while holding a single admission permit, so at
//! most `concurrency_limit` question evaluations are in flight.
//!
//! Results land in a pre-sized slot vector indexed by question position.
//! Each slot is written once when its trial joins, so the final order is
//! the input order whatever the completion order.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::agent::{Agent, AgentError, AgentPair, Scorer};
use crate::config::HarnessConfig;
use crate::context::RunContext;
use crate::error::{HarnessError, Result};
use crate::metrics::{InvocationFailure, RawInvocation, normalize};
use crate::retry::{RetryPolicy, execute_with_backoff_cancellable};
use crate::store::{JOURNAL_FILENAME, JournalWriter, StoreError, run_dir};
use crate::suite::Suite;
use crate::types::{
    AgentResponse, ErrorKind, Question, RunCompletion, SuiteMetadata, SuiteRun, TestResult,
};

/// Admission, retry and timeout settings for a run
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPolicy {
    pub concurrency_limit: usize,
    pub retry: RetryPolicy,
    /// Per-invocation timeout; retry backoff is not counted against it
    pub timeout: Duration,
}

impl ExecutionPolicy {
    pub fn new(concurrency_limit: usize, retry: RetryPolicy, timeout: Duration) -> Result<Self> {
        if concurrency_limit == 0 {
            return Err(HarnessError::InvalidPolicy(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if concurrency_limit > Semaphore::MAX_PERMITS {
            return Err(HarnessError::InvalidPolicy(format!(
                "concurrency_limit {concurrency_limit} exceeds {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if timeout.is_zero() {
            return Err(HarnessError::InvalidPolicy(
                "timeout must be non-zero".to_string(),
            ));
        }
        Ok(Self {
            concurrency_limit,
            retry,
            timeout,
        })
    }

    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        Self::new(
            config.execution.concurrency_limit,
            config.retry.clone(),
            config.execution.timeout(),
        )
    }
}

pub struct ExecutionEngine {
    policy: ExecutionPolicy,
    journal_root: Option<PathBuf>,
    scorer: Option<Arc<dyn Scorer>>,
}

impl ExecutionEngine {
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self {
            policy,
            journal_root: None,
            scorer: None,
        }
    }

    /// Engine configured from `config`, journaling under the storage root
    /// when enabled
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let engine = Self::new(ExecutionPolicy::from_config(config)?);
        Ok(if config.storage.journal {
            engine.with_journal(config.storage.root_dir.clone())
        } else {
            engine
        })
    }

    /// Append finished trials to `<root>/<run_id>/journal.jsonl`
    pub fn with_journal(mut self, root: impl Into<PathBuf>) -> Self {
        self.journal_root = Some(root.into());
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn policy(&self) -> &ExecutionPolicy {
        &self.policy
    }

    /// Run every question of `suite` against both agents.
    ///
    /// Agent failures are recorded on their trial and never returned.
    /// Cancelling `ctx` stops new trials from being dispatched; trials in
    /// flight finish and the run is marked `Cancelled`. A journal write
    /// failure stops dispatch too and returns `RunAborted` with the
    /// partial run.
    pub async fn run_suite(
        &self,
        ctx: &RunContext,
        suite: &Suite,
        agents: &AgentPair,
    ) -> Result<SuiteRun> {
        self.execute(ctx, suite, agents)
            .instrument(ctx.span().clone())
            .await
    }

    async fn execute(&self, ctx: &RunContext, suite: &Suite, agents: &AgentPair) -> Result<SuiteRun> {
        let questions = suite.questions();
        let total = questions.len();
        let run_id = ctx.run_id();
        let mut run = SuiteRun::begin(run_id, self.metadata(suite, agents), Utc::now());

        tracing::info!(
            suite = %suite.name,
            questions = total,
            baseline = agents.baseline.name(),
            variant = agents.variant.name(),
            concurrency_limit = self.policy.concurrency_limit,
            "Starting suite run"
        );

        // Stops dispatch on run cancellation or journal failure
        let stop = ctx.cancellation_token().child_token();

        let journal = match &self.journal_root {
            Some(root) => {
                let path = run_dir(root, run_id).join(JOURNAL_FILENAME);
                match JournalWriter::create(path, stop.clone()).await {
                    Ok(journal) => Some(journal),
                    Err(err) => return Err(abort(run, err)),
                }
            }
            None => None,
        };

        let semaphore = Arc::new(Semaphore::new(self.policy.concurrency_limit));
        let mut slots: Vec<Option<TestResult>> = vec![None; total];
        let mut dispatch_times: Vec<DateTime<Utc>> = Vec::with_capacity(total);
        let mut tasks: JoinSet<(usize, TestResult)> = JoinSet::new();
        let mut last_dispatch = run.started_at;

        while dispatch_times.len() < total {
            let permit = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    store_trial(joined, &mut slots, journal.as_ref());
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let index = dispatch_times.len();
            let timestamp = Utc::now().max(last_dispatch);
            last_dispatch = timestamp;
            dispatch_times.push(timestamp);

            let question = questions[index].clone();
            let span = tracing::info_span!("abeval.trial", index, question_id = %question.id);
            tasks.spawn(
                run_trial(TrialSpec {
                    index,
                    question,
                    timestamp,
                    agents: agents.clone(),
                    retry: self.policy.retry.clone(),
                    timeout: self.policy.timeout,
                    cancel: stop.clone(),
                    scorer: self.scorer.clone(),
                    permit,
                })
                .instrument(span),
            );
        }

        let dispatched = dispatch_times.len();
        if dispatched < total {
            tracing::warn!(dispatched, total, "Dispatch stopped; draining in-flight trials");
        }
        while let Some(joined) = tasks.join_next().await {
            store_trial(joined, &mut slots, journal.as_ref());
        }

        let journal_result = match journal {
            Some(journal) => journal.finish().await.map(Some),
            None => Ok(None),
        };

        run.results = slots
            .into_iter()
            .zip(questions)
            .zip(dispatch_times)
            .map(|((slot, question), timestamp)| {
                slot.unwrap_or_else(|| lost_trial(question, timestamp))
            })
            .collect();
        run.finished_at = Some(Utc::now());

        let journaled = match journal_result {
            Ok(journaled) => journaled,
            Err(err) => return Err(abort(run, err)),
        };

        run.completion = if dispatched == total {
            RunCompletion::Complete
        } else {
            RunCompletion::Cancelled { dispatched, total }
        };
        tracing::info!(
            results = run.results.len(),
            failed = run.failed_trials().count(),
            journaled = ?journaled,
            completion = ?run.completion,
            "Suite run finished"
        );
        Ok(run)
    }

    fn metadata(&self, suite: &Suite, agents: &AgentPair) -> SuiteMetadata {
        SuiteMetadata {
            name: suite.name.clone(),
            selection: suite.selection.clone(),
            question_count: suite.len(),
            baseline_agent: agents.baseline.name().to_string(),
            variant_agent: agents.variant.name().to_string(),
            concurrency_limit: self.policy.concurrency_limit,
            max_attempts: self.policy.retry.max_attempts,
            timeout_ms: u64::try_from(self.policy.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

fn abort(mut run: SuiteRun, err: StoreError) -> HarnessError {
    tracing::error!("Aborting run: {err}");
    run.completion = RunCompletion::Aborted {
        reason: err.to_string(),
    };
    if run.finished_at.is_none() {
        run.finished_at = Some(Utc::now());
    }
    HarnessError::RunAborted {
        run_id: run.run_id,
        source: err,
        partial: Box::new(run),
    }
}

fn store_trial(
    joined: std::result::Result<(usize, TestResult), JoinError>,
    slots: &mut [Option<TestResult>],
    journal: Option<&JournalWriter>,
) {
    match joined {
        Ok((index, result)) => {
            if let Some(journal) = journal {
                journal.record(index, &result);
            }
            slots[index] = Some(result);
        }
        // Agent panics are caught inside the trial; reaching this means the
        // trial wrapper itself died and its slot is filled by `lost_trial`.
        Err(err) => tracing::error!("Trial task failed: {err}"),
    }
}

fn lost_trial(question: &Question, timestamp: DateTime<Utc>) -> TestResult {
    let failed = || AgentResponse::failed(ErrorKind::Internal, "trial task failed", 0, 0);
    TestResult {
        question_id: question.id.clone(),
        baseline: failed(),
        variant: failed(),
        context_tokens: 0,
        timestamp,
        judgement: None,
    }
}

struct TrialSpec {
    index: usize,
    question: Question,
    timestamp: DateTime<Utc>,
    agents: AgentPair,
    retry: RetryPolicy,
    timeout: Duration,
    cancel: CancellationToken,
    scorer: Option<Arc<dyn Scorer>>,
    /// Held until the trial resolves
    permit: OwnedSemaphorePermit,
}

async fn run_trial(spec: TrialSpec) -> (usize, TestResult) {
    let TrialSpec {
        index,
        question,
        timestamp,
        agents,
        retry,
        timeout,
        cancel,
        scorer,
        permit,
    } = spec;

    // Both agents see the same allocation, not just equal strings
    let text: Arc<str> = Arc::from(question.text.as_str());
    let baseline = tokio::spawn(
        invoke_agent(agents.baseline.clone(), text.clone(), retry.clone(), timeout, cancel.clone())
            .in_current_span(),
    );
    let variant = tokio::spawn(
        invoke_agent(agents.variant.clone(), text, retry, timeout, cancel).in_current_span(),
    );
    let (baseline, variant) = tokio::join!(baseline, variant);
    let baseline = joined_response(baseline, agents.baseline.as_ref());
    let variant = joined_response(variant, agents.variant.as_ref());
    drop(permit);

    let judgement = match scorer {
        Some(scorer) if baseline.is_ok() && variant.is_ok() => {
            judge(scorer, &question, &baseline, &variant).await
        }
        _ => None,
    };

    tracing::debug!(
        baseline_ok = baseline.is_ok(),
        variant_ok = variant.is_ok(),
        baseline_latency_ms = baseline.latency_ms,
        variant_latency_ms = variant.latency_ms,
        "Trial finished"
    );

    let result = TestResult {
        question_id: question.id,
        context_tokens: agents.variant.context_tokens(),
        baseline,
        variant,
        timestamp,
        judgement,
    };
    (index, result)
}

async fn invoke_agent(
    agent: Arc<dyn Agent>,
    text: Arc<str>,
    retry: RetryPolicy,
    timeout: Duration,
    cancel: CancellationToken,
) -> AgentResponse {
    let report = execute_with_backoff_cancellable(
        |attempt| {
            let agent = agent.clone();
            let text = text.clone();
            async move {
                tracing::trace!(agent = agent.name(), attempt, "Invoking agent");
                match tokio::time::timeout(timeout, agent.invoke(&text)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AgentError::timeout(timeout)),
                }
            }
        },
        &retry,
        &cancel,
        |status| {
            tracing::warn!(
                agent = agent.name(),
                attempt = status.attempt,
                sleep_ms = status.sleep.as_millis() as u64,
                rate_limited = status.is_rate_limit,
                "Retrying after transient failure: {}",
                status.reason
            );
        },
    )
    .await;

    normalize(RawInvocation {
        outcome: report.outcome.map_err(InvocationFailure::from),
        latency: report.elapsed,
        attempts: report.attempts,
    })
}

fn joined_response(
    joined: std::result::Result<AgentResponse, JoinError>,
    agent: &dyn Agent,
) -> AgentResponse {
    match joined {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(agent = agent.name(), "Agent task failed: {err}");
            AgentResponse::failed(ErrorKind::Internal, format!("agent task failed: {err}"), 0, 1)
        }
    }
}

async fn judge(
    scorer: Arc<dyn Scorer>,
    question: &Question,
    baseline: &AgentResponse,
    variant: &AgentResponse,
) -> Option<serde_json::Value> {
    let (question, baseline, variant) = (question.clone(), baseline.clone(), variant.clone());
    let judged = tokio::spawn(
        async move { scorer.judge(&question, &baseline, &variant).await }.in_current_span(),
    )
    .await;
    match judged {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            tracing::warn!("Scorer failed, leaving judgement empty: {err}");
            None
        }
        Err(err) => {
            tracing::warn!("Scorer task failed, leaving judgement empty: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_rejects_zero_concurrency() {
        let err = ExecutionPolicy::new(0, RetryPolicy::default(), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidPolicy(_)));
        assert!(
            ExecutionPolicy::new(1, RetryPolicy::default(), Duration::ZERO).is_err()
        );
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = HarnessConfig::default();
        config.execution.concurrency_limit = 7;
        config.execution.timeout_ms = 2_500;
        let policy = ExecutionPolicy::from_config(&config).unwrap();
        assert_eq!(policy.concurrency_limit, 7);
        assert_eq!(policy.timeout, Duration::from_millis(2_500));
        assert_eq!(policy.retry, config.retry);

        let engine = ExecutionEngine::from_config(&config).unwrap();
        assert_eq!(engine.journal_root, Some(config.storage.root_dir.clone()));
        config.storage.journal = false;
        assert!(ExecutionEngine::from_config(&config).unwrap().journal_root.is_none());
    }
}
