#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use abeval_harness::{
    Agent, AgentError, AgentReply, AgentResponse, Category, ErrorKind, ExecutionPolicy,
    Question, RawAgentOutput, ResponseStatus, RetryPolicy, RunCompletion, RunId, SCHEMA_VERSION,
    SelectionPolicy, Suite, SuiteMetadata, SuiteRun, TestResult,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

/// One scripted reaction to an invocation
#[derive(Debug, Clone)]
pub enum Step {
    Reply {
        prompt_tokens: u64,
        completion_tokens: u64,
        delay: Duration,
    },
    Fail(AgentError),
    /// Never answers within any sane timeout
    Hang,
    Panic,
    Json(serde_json::Value),
}

/// Agent whose behaviour per question text is scripted up front.
///
/// Unscripted invocations reply after `default_delay` with
/// `default_prompt_tokens` prompt tokens.
pub struct ScriptedAgent {
    name: String,
    default_delay: Duration,
    default_prompt_tokens: u64,
    context_tokens: u64,
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    received: Mutex<Vec<String>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            default_delay: Duration::from_millis(10),
            default_prompt_tokens: 100,
            context_tokens: 0,
            scripts: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn with_prompt_tokens(mut self, tokens: u64) -> Self {
        self.default_prompt_tokens = tokens;
        self
    }

    pub fn with_context_tokens(mut self, tokens: u64) -> Self {
        self.context_tokens = tokens;
        self
    }

    pub fn script(self, question_text: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(question_text.to_string(), steps.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, question_text: &str) -> usize {
        self.received
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.as_str() == question_text)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    fn next_step(&self, question_text: &str) -> Step {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(question_text)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Step::Reply {
                prompt_tokens: self.default_prompt_tokens,
                completion_tokens: 20,
                delay: self.default_delay,
            })
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, question_text: &str) -> Result<RawAgentOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().unwrap().push(question_text.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        match self.next_step(question_text) {
            Step::Reply {
                prompt_tokens,
                completion_tokens,
                delay,
            } => {
                tokio::time::sleep(delay).await;
                Ok(AgentReply {
                    response_text: format!("{} answers: {question_text}", self.name),
                    prompt_tokens,
                    completion_tokens,
                    model_name: format!("{}-model", self.name),
                }
                .into())
            }
            Step::Fail(err) => Err(err),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Err(AgentError::unavailable("woke from hang"))
            }
            Step::Panic => panic!("scripted agent panic"),
            Step::Json(value) => Ok(RawAgentOutput::Json(value)),
        }
    }

    fn context_tokens(&self) -> u64 {
        self.context_tokens
    }
}

pub fn questions(n: usize) -> Vec<Question> {
    let categories = Category::all();
    (0..n)
        .map(|i| {
            Question::new(
                format!("q{i}"),
                format!("Question {i}: how does feature {i} work?"),
                categories[i % categories.len()],
            )
        })
        .collect()
}

pub fn suite(n: usize) -> Suite {
    Suite::from_questions("test-suite", questions(n)).unwrap()
}

/// Deterministic retry policy: no jitter, 100ms then 200ms backoff
pub fn retry_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff_ms: 100,
        max_backoff_ms: 1_000,
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    }
}

pub fn policy(concurrency_limit: usize, max_attempts: u32) -> ExecutionPolicy {
    ExecutionPolicy::new(
        concurrency_limit,
        retry_policy(max_attempts),
        Duration::from_secs(5),
    )
    .unwrap()
}

pub fn ts(offset_ms: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + chrono::Duration::milliseconds(offset_ms)
}

pub fn ok_response(prompt_tokens: u64, completion_tokens: u64, latency_ms: u64) -> AgentResponse {
    AgentResponse {
        response_text: "An answer, with \"quotes\"\nand a second line".to_string(),
        prompt_tokens,
        completion_tokens,
        latency_ms,
        model_name: "model-a".to_string(),
        attempts: 1,
        status: ResponseStatus::Ok,
    }
}

pub fn trial(id: &str, baseline: AgentResponse, variant: AgentResponse, at: i64) -> TestResult {
    TestResult {
        question_id: id.to_string(),
        baseline,
        variant,
        context_tokens: 1_500,
        timestamp: ts(at),
        judgement: None,
    }
}

/// Finished run with `results`, metadata filled in
pub fn run_with(results: Vec<TestResult>) -> SuiteRun {
    SuiteRun {
        schema_version: SCHEMA_VERSION,
        run_id: RunId::new(),
        suite: SuiteMetadata {
            name: "fixture".to_string(),
            selection: SelectionPolicy::Sample { size: 3, seed: 7 },
            question_count: results.len(),
            baseline_agent: "baseline".to_string(),
            variant_agent: "variant".to_string(),
            concurrency_limit: 2,
            max_attempts: 3,
            timeout_ms: 60_000,
        },
        results,
        started_at: ts(0),
        finished_at: Some(ts(10_000)),
        completion: RunCompletion::Complete,
    }
}

/// Three trials, one with a failed variant and a judgement on another
pub fn mixed_run() -> SuiteRun {
    let mut judged = trial("q0", ok_response(120, 40, 900), ok_response(1_620, 55, 1_100), 1);
    judged.judgement = Some(serde_json::json!({"preferred": "variant", "score": 0.75}));
    let failed = trial(
        "q1",
        ok_response(90, 30, 700),
        AgentResponse::failed(ErrorKind::Timeout, "Invocation timed out after 60s", 180_400, 3),
        2,
    );
    let plain = trial("q2", ok_response(100, 25, 800), ok_response(1_600, 28, 1_250), 2);
    run_with(vec![judged, failed, plain])
}
