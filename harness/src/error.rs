//! Error types for the harness
//!
//! Agent failures never appear here: they are classified and recorded on
//! the trial. Only configuration, loading, persistence and aborted runs
//! surface to the caller.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::types::{RunId, SuiteRun};

/// Result type alias using HarnessError
pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bank(#[from] BankError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid execution policy: {0}")]
    InvalidPolicy(String),

    /// Storage failed mid-run; `partial` holds every trial that finished,
    /// marked aborted.
    #[error("Run {run_id} aborted: {source}")]
    RunAborted {
        run_id: RunId,
        #[source]
        source: StoreError,
        partial: Box<SuiteRun>,
    },
}

impl HarnessError {
    /// Partial run carried by an aborted execution
    pub fn partial_run(&self) -> Option<&SuiteRun> {
        match self {
            HarnessError::RunAborted { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

/// Question loading and suite selection errors
#[derive(Debug, Error)]
pub enum BankError {
    #[error("Failed to read question bank {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse question bank {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Unsupported question bank format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Duplicate question id '{0}'")]
    DuplicateId(String),

    #[error("Invalid question at position {position}: {reason}")]
    InvalidQuestion { position: usize, reason: String },

    #[error("Sample size {requested} exceeds available questions ({available})")]
    SampleTooLarge { requested: usize, available: usize },
}
