//! StatisticsEngine over a `SuiteRun`
//!
//! A trial contributes to the metrics only when both sides succeeded, so
//! every sample stays paired. Failed trials are counted as excluded.

use abeval_stats::{SignificanceConfig, StatSummary, summarize_pairs};

use crate::context::RunContext;
use crate::types::{AgentResponse, SuiteRun};

pub type Extractor = fn(&AgentResponse) -> f64;

/// Tracked metrics, in report order
pub const METRICS: &[(&str, Extractor)] = &[
    ("latency_ms", latency_ms),
    ("prompt_tokens", prompt_tokens),
    ("completion_tokens", completion_tokens),
];

fn latency_ms(response: &AgentResponse) -> f64 {
    response.latency_ms as f64
}

fn prompt_tokens(response: &AgentResponse) -> f64 {
    response.prompt_tokens as f64
}

fn completion_tokens(response: &AgentResponse) -> f64 {
    response.completion_tokens as f64
}

/// One `StatSummary` per entry of `METRICS`, in order
pub fn aggregate(
    ctx: &RunContext,
    run: &SuiteRun,
    config: &SignificanceConfig,
) -> Vec<StatSummary> {
    let _span = ctx.span().enter();
    let usable: Vec<_> = run.results.iter().filter(|r| r.both_ok()).collect();
    let excluded = run.results.len() - usable.len();

    METRICS
        .iter()
        .map(|(name, extract)| {
            let pairs: Vec<(f64, f64)> = usable
                .iter()
                .map(|r| (extract(&r.baseline), extract(&r.variant)))
                .collect();
            let summary = summarize_pairs(name, &pairs, excluded, config);
            tracing::debug!(
                metric = *name,
                pairs = summary.pairs,
                excluded = summary.excluded_pairs,
                p_value = ?summary.p_value,
                verdict = %summary.verdict,
                "Aggregated metric"
            );
            summary
        })
        .collect()
}
