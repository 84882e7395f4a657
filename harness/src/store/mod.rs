//! ResultStore: durable, reloadable suite runs
//!
//! On-disk layout under the store root:
//!
//! ```text
//! <root>/<run_id>/run.json       full structured run, schema-versioned
//! <root>/<run_id>/results.csv    one row per TestResult
//! <root>/<run_id>/journal.jsonl  trials appended while the run executes
//! ```

pub mod export;
pub mod io;
pub mod journal;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::context::RunContext;
use crate::types::{RunId, SCHEMA_VERSION, SuiteRun};

pub use journal::{JournalEntry, JournalWriter};

pub const RUN_FILENAME: &str = "run.json";
pub const CSV_FILENAME: &str = "results.csv";
pub const JOURNAL_FILENAME: &str = "journal.jsonl";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run {run_id} not found at {path}")]
    NotFound { run_id: RunId, path: PathBuf },

    /// A run with this id is already persisted; pass `overwrite` to replace it
    #[error("Run {run_id} already exists at {path}")]
    Collision { run_id: RunId, path: PathBuf },

    #[error("Run file corrupted at {path}: {reason}")]
    Corrupted { path: PathBuf, reason: String },

    #[error("Schema version mismatch at {path}: expected {expected}, found {found}")]
    SchemaMismatch {
        path: PathBuf,
        expected: u32,
        found: u64,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Journal writer failed for {path}: {reason}")]
    Journal { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Options for `ResultStore::persist`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistOptions {
    /// Replace an existing run with the same id
    pub overwrite: bool,
    /// Also write the tabular export
    pub export_csv: bool,
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            export_csv: true,
        }
    }
}

impl PersistOptions {
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            ..Self::default()
        }
    }
}

pub trait ResultStore: Send + Sync {
    /// Persist `run`, returning where it was stored
    fn persist(
        &self,
        ctx: &RunContext,
        run: &SuiteRun,
        options: PersistOptions,
    ) -> Result<PathBuf, StoreError>;

    fn load(&self, ctx: &RunContext, run_id: RunId) -> Result<SuiteRun, StoreError>;

    /// Ids of every persisted run, sorted
    fn list_runs(&self) -> Result<Vec<RunId>, StoreError>;
}

/// Directory-per-run store on the local filesystem
#[derive(Debug, Clone)]
pub struct FileResultStore {
    root: PathBuf,
}

impl FileResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: RunId) -> PathBuf {
        run_dir(&self.root, run_id)
    }

    pub fn run_path(&self, run_id: RunId) -> PathBuf {
        self.run_dir(run_id).join(RUN_FILENAME)
    }

    pub fn journal_path(&self, run_id: RunId) -> PathBuf {
        self.run_dir(run_id).join(JOURNAL_FILENAME)
    }

    /// Write `results.csv` for `run`, replacing any previous export
    pub fn export_csv(&self, ctx: &RunContext, run: &SuiteRun) -> Result<PathBuf, StoreError> {
        let _span = ctx.span().enter();
        let path = self.run_dir(run.run_id).join(CSV_FILENAME);
        let csv = export::to_csv_bytes(run)?;
        io::write_atomic(&path, &csv, true).map_err(|e| StoreError::io(&path, e))?;
        tracing::debug!(path = %path.display(), rows = run.results.len(), "Exported CSV");
        Ok(path)
    }

    /// Trials journaled while `run_id` executed, in completion order
    pub fn load_journal(&self, run_id: RunId) -> Result<Vec<JournalEntry>, StoreError> {
        let path = self.journal_path(run_id);
        if !path.exists() {
            return Err(StoreError::NotFound { run_id, path });
        }
        journal::read_journal(&path)
    }
}

impl ResultStore for FileResultStore {
    fn persist(
        &self,
        ctx: &RunContext,
        run: &SuiteRun,
        options: PersistOptions,
    ) -> Result<PathBuf, StoreError> {
        let _span = ctx.span().enter();
        let path = self.run_path(run.run_id);
        let json = serde_json::to_vec_pretty(run)?;

        io::write_atomic(&path, &json, options.overwrite).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                StoreError::Collision {
                    run_id: run.run_id,
                    path: path.clone(),
                }
            } else {
                StoreError::io(&path, e)
            }
        })?;

        let csv_path = self.run_dir(run.run_id).join(CSV_FILENAME);
        if options.export_csv {
            self.export_csv(ctx, run)?;
        } else if options.overwrite {
            // Drop an export belonging to the replaced run
            match std::fs::remove_file(&csv_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&csv_path, e)),
            }
        }

        tracing::info!(
            run_id = %run.run_id,
            path = %path.display(),
            results = run.results.len(),
            overwrite = options.overwrite,
            "Persisted suite run"
        );
        Ok(path)
    }

    fn load(&self, ctx: &RunContext, run_id: RunId) -> Result<SuiteRun, StoreError> {
        let _span = ctx.span().enter();
        let path = self.run_path(run_id);
        if !path.exists() {
            return Err(StoreError::NotFound { run_id, path });
        }

        let content = std::fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        let corrupted = |reason: String| StoreError::Corrupted {
            path: path.clone(),
            reason,
        };

        let value: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| corrupted(e.to_string()))?;
        let found = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| corrupted("missing schema_version".to_string()))?;
        if found != u64::from(SCHEMA_VERSION) {
            return Err(StoreError::SchemaMismatch {
                path: path.clone(),
                expected: SCHEMA_VERSION,
                found,
            });
        }

        let run: SuiteRun = serde_json::from_value(value).map_err(|e| corrupted(e.to_string()))?;
        if run.run_id != run_id {
            return Err(corrupted(format!(
                "file holds run {} instead of {run_id}",
                run.run_id
            )));
        }
        tracing::debug!(run_id = %run_id, results = run.results.len(), "Loaded suite run");
        Ok(run)
    }

    fn list_runs(&self) -> Result<Vec<RunId>, StoreError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.root, e))?;
            let Some(run_id) = entry.file_name().to_str().and_then(|n| RunId::parse(n).ok())
            else {
                continue;
            };
            if entry.path().join(RUN_FILENAME).is_file() {
                runs.push(run_id);
            }
        }
        runs.sort();
        Ok(runs)
    }
}

pub(crate) fn run_dir(root: &Path, run_id: RunId) -> PathBuf {
    root.join(run_id.to_string())
}
