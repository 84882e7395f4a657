//! Append-only run journal.
//!
//! Trials are handed over an unbounded channel to one writer task, so
//! concurrent completions never contend for the file and sending never
//! blocks scheduling. Each line is `{"index": i, "result": {...}}`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::StoreError;
use crate::types::TestResult;

/// One journaled trial and its position in the suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub index: usize,
    pub result: TestResult,
}

pub struct JournalWriter {
    path: PathBuf,
    tx: mpsc::UnboundedSender<JournalEntry>,
    handle: JoinHandle<Result<usize, StoreError>>,
}

impl JournalWriter {
    /// Open (append) `path` and start the writer task.
    ///
    /// `on_failure` is cancelled when a write fails.
    pub async fn create(
        path: impl Into<PathBuf>,
        on_failure: CancellationToken,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StoreError::io(dir, source))?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| StoreError::io(&path, source))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(
            write_loop(file, path.clone(), rx, on_failure).instrument(tracing::Span::current()),
        );
        Ok(Self { path, tx, handle })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a finished trial. A dead writer has already reported its
    /// failure through `on_failure`, so send errors are dropped.
    pub fn record(&self, index: usize, result: &TestResult) {
        let _ = self.tx.send(JournalEntry {
            index,
            result: result.clone(),
        });
    }

    /// Flush queued entries and stop; returns how many were written
    pub async fn finish(self) -> Result<usize, StoreError> {
        drop(self.tx);
        match self.handle.await {
            Ok(result) => result,
            Err(join_err) => Err(StoreError::Journal {
                path: self.path,
                reason: join_err.to_string(),
            }),
        }
    }
}

async fn write_loop(
    mut file: tokio::fs::File,
    path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<JournalEntry>,
    on_failure: CancellationToken,
) -> Result<usize, StoreError> {
    let mut written = 0usize;
    while let Some(entry) = rx.recv().await {
        if let Err(err) = append_entry(&mut file, &path, &entry).await {
            tracing::error!(path = %path.display(), index = entry.index, "Journal write failed: {err}");
            on_failure.cancel();
            return Err(err);
        }
        written += 1;
    }
    Ok(written)
}

async fn append_entry(
    file: &mut tokio::fs::File,
    path: &Path,
    entry: &JournalEntry,
) -> Result<(), StoreError> {
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    file.write_all(&line)
        .await
        .map_err(|source| StoreError::io(path, source))?;
    file.sync_data()
        .await
        .map_err(|source| StoreError::io(path, source))
}

/// Read entries back. A torn final line (crash mid-append) is skipped;
/// any other undecodable line is corruption.
pub fn read_journal(path: &Path) -> Result<Vec<JournalEntry>, StoreError> {
    let content = std::fs::read_to_string(path).map_err(|source| StoreError::io(path, source))?;
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut entries = Vec::with_capacity(lines.len());
    for (n, line) in lines.iter().enumerate() {
        match serde_json::from_str::<JournalEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(err) if n + 1 == lines.len() && !content.ends_with('\n') => {
                tracing::warn!(path = %path.display(), "Skipping torn journal line: {err}");
            }
            Err(err) => {
                return Err(StoreError::Corrupted {
                    path: path.to_path_buf(),
                    reason: format!("line {}: {err}", n + 1),
                });
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AgentResponse, ErrorKind};
    use pretty_assertions::assert_eq;

    fn result(id: &str) -> TestResult {
        TestResult {
            question_id: id.to_string(),
            baseline: AgentResponse::failed(ErrorKind::Timeout, "timed out", 10, 2),
            variant: AgentResponse::failed(ErrorKind::Rejected, "refused", 5, 1),
            context_tokens: 0,
            timestamp: chrono::Utc::now(),
            judgement: None,
        }
    }

    #[tokio::test]
    async fn test_writer_appends_entries_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run").join("journal.jsonl");
        let stop = CancellationToken::new();

        let writer = JournalWriter::create(&path, stop.clone()).await.unwrap();
        assert_eq!(writer.path(), path.as_path());
        writer.record(1, &result("q1"));
        writer.record(0, &result("q0"));
        assert_eq!(writer.finish().await.unwrap(), 2);
        assert!(!stop.is_cancelled());

        let entries = read_journal(&path).unwrap();
        let order: Vec<(usize, &str)> = entries
            .iter()
            .map(|e| (e.index, e.result.question_id.as_str()))
            .collect();
        assert_eq!(order, vec![(1, "q1"), (0, "q0")]);
    }

    #[test]
    fn test_torn_final_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let entry = serde_json::to_string(&JournalEntry {
            index: 0,
            result: result("q0"),
        })
        .unwrap();
        std::fs::write(&path, format!("{entry}\n{{\"index\": 1, \"res")).unwrap();
        assert_eq!(read_journal(&path).unwrap().len(), 1);

        std::fs::write(&path, format!("not json\n{entry}\n")).unwrap();
        assert!(matches!(
            read_journal(&path),
            Err(StoreError::Corrupted { .. })
        ));
    }
}
