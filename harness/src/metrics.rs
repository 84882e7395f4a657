//! MetricsCollector: raw invocation outcome → `AgentResponse`
//!
//! `normalize` is pure and never fails. Anything it cannot make sense of
//! becomes `ResponseStatus::Error { kind: ParseFailure, .. }`.

use std::time::Duration;

use serde_json::Value;

use crate::agent::{AgentError, AgentReply, RawAgentOutput};
use crate::retry::RetryError;
use crate::types::{AgentResponse, ErrorKind, ResponseStatus};

const TEXT_KEYS: &[&str] = &["/response_text", "/response", "/answer", "/text"];
const PROMPT_TOKEN_KEYS: &[&str] = &[
    "/prompt_tokens",
    "/input_tokens",
    "/usage/prompt_tokens",
    "/usage/input_tokens",
];
const COMPLETION_TOKEN_KEYS: &[&str] = &[
    "/completion_tokens",
    "/output_tokens",
    "/usage/completion_tokens",
    "/usage/output_tokens",
];
const MODEL_KEYS: &[&str] = &["/model_name", "/model"];

/// Classified failure of an invocation sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl InvocationFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<RetryError<AgentError>> for InvocationFailure {
    fn from(err: RetryError<AgentError>) -> Self {
        let message = err.to_string();
        let kind = if err.is_aborted() {
            ErrorKind::Cancelled
        } else {
            err.last_error().kind()
        };
        Self { kind, message }
    }
}

/// Everything known about one agent's attempts on one question
#[derive(Debug, Clone)]
pub struct RawInvocation {
    pub outcome: Result<RawAgentOutput, InvocationFailure>,
    /// First attempt start to resolution
    pub latency: Duration,
    pub attempts: u32,
}

pub fn normalize(raw: RawInvocation) -> AgentResponse {
    let latency_ms = u64::try_from(raw.latency.as_millis()).unwrap_or(u64::MAX);
    let reply = match raw.outcome {
        Ok(RawAgentOutput::Reply(reply)) => Ok(reply),
        Ok(RawAgentOutput::Json(value)) => reply_from_json(&value)
            .map_err(|reason| InvocationFailure::new(ErrorKind::ParseFailure, reason)),
        Err(failure) => Err(failure),
    };

    match reply {
        Ok(reply) => AgentResponse {
            response_text: reply.response_text,
            prompt_tokens: reply.prompt_tokens,
            completion_tokens: reply.completion_tokens,
            latency_ms,
            model_name: reply.model_name,
            attempts: raw.attempts,
            status: ResponseStatus::Ok,
        },
        Err(failure) => {
            AgentResponse::failed(failure.kind, failure.message, latency_ms, raw.attempts)
        }
    }
}

fn reply_from_json(value: &Value) -> Result<AgentReply, String> {
    if !value.is_object() {
        return Err(format!("agent output is not an object: {value}"));
    }
    let response_text = first_present(value, TEXT_KEYS)
        .ok_or_else(|| "agent output has no response text".to_string())?
        .as_str()
        .ok_or_else(|| "response text is not a string".to_string())?
        .to_string();
    let prompt_tokens = token_count(value, PROMPT_TOKEN_KEYS, "prompt")?;
    let completion_tokens = token_count(value, COMPLETION_TOKEN_KEYS, "completion")?;
    let model_name = match first_present(value, MODEL_KEYS) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(name)) => name.clone(),
        Some(other) => return Err(format!("model name is not a string: {other}")),
    };

    Ok(AgentReply {
        response_text,
        prompt_tokens,
        completion_tokens,
        model_name,
    })
}

fn first_present<'a>(value: &'a Value, pointers: &[&str]) -> Option<&'a Value> {
    pointers.iter().find_map(|pointer| value.pointer(pointer))
}

fn token_count(value: &Value, pointers: &[&str], label: &str) -> Result<u64, String> {
    let field = first_present(value, pointers)
        .ok_or_else(|| format!("agent output has no {label} token count"))?;
    match field {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| format!("{label} token count is not a non-negative integer: {n}")),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("{label} token count is not an integer: {s:?}")),
        other => Err(format!("{label} token count has unexpected type: {other}")),
    }
}
