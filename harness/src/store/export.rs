//! Flattened tabular export: one CSV row per `TestResult`.
//!
//! Produced straight from the in-memory `SuiteRun`; no reload needed.

use std::io::Write;

use chrono::SecondsFormat;

use crate::types::{AgentResponse, ResponseStatus, SuiteRun, TestResult};

const SIDE_COLUMNS: &[&str] = &[
    "status",
    "error_kind",
    "prompt_tokens",
    "completion_tokens",
    "latency_ms",
    "model",
    "attempts",
    "response",
];

/// Header row, in column order
pub fn csv_header() -> Vec<String> {
    let mut header: Vec<String> = ["run_id", "index", "question_id", "timestamp", "context_tokens"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    for side in ["baseline", "variant"] {
        header.extend(SIDE_COLUMNS.iter().map(|c| format!("{side}_{c}")));
    }
    header.push("token_overhead".to_string());
    header.push("latency_diff_ms".to_string());
    header
}

/// Write the header and one row per result to `out`
pub fn write_csv<W: Write>(run: &SuiteRun, out: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    write_records(run, &mut writer)?;
    writer.flush()?;
    Ok(())
}

pub fn to_csv_bytes(run: &SuiteRun) -> csv::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    write_records(run, &mut writer)?;
    writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))
}

pub fn to_csv_string(run: &SuiteRun) -> csv::Result<String> {
    let bytes = to_csv_bytes(run)?;
    String::from_utf8(bytes).map_err(|err| {
        csv::Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    })
}

fn write_records<W: Write>(run: &SuiteRun, writer: &mut csv::Writer<W>) -> csv::Result<()> {
    writer.write_record(csv_header())?;
    let run_id = run.run_id.to_string();
    for (index, result) in run.results.iter().enumerate() {
        writer.write_record(row_for(&run_id, index, result))?;
    }
    Ok(())
}

fn row_for(run_id: &str, index: usize, result: &TestResult) -> Vec<String> {
    let mut row = vec![
        run_id.to_string(),
        index.to_string(),
        result.question_id.clone(),
        result.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        result.context_tokens.to_string(),
    ];
    push_side(&mut row, &result.baseline);
    push_side(&mut row, &result.variant);
    row.push(result.token_overhead().to_string());
    row.push(result.latency_diff_ms().to_string());
    row
}

fn push_side(row: &mut Vec<String>, response: &AgentResponse) {
    let (status, kind) = match &response.status {
        ResponseStatus::Ok => ("ok", String::new()),
        ResponseStatus::Error { kind, .. } => ("error", kind.to_string()),
    };
    row.push(status.to_string());
    row.push(kind);
    row.push(response.prompt_tokens.to_string());
    row.push(response.completion_tokens.to_string());
    row.push(response.latency_ms.to_string());
    row.push(response.model_name.clone());
    row.push(response.attempts.to_string());
    row.push(response.response_text.clone());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_shape() {
        let header = csv_header();
        assert_eq!(header.len(), 5 + 2 * SIDE_COLUMNS.len() + 2);
        assert_eq!(header[5], "baseline_status");
        assert_eq!(header[13], "variant_status");
        assert_eq!(header.last().map(String::as_str), Some("latency_diff_ms"));
    }
}
