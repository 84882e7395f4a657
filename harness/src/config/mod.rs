//! Harness configuration
//!
//! Layered with the 12-factor pattern:
//! 1. Defaults (from code)
//! 2. Config file (abeval.toml)
//! 3. Environment variables (ABEVAL_* prefix, `__` for nesting)
//!
//! The merged result is checked against an embedded JSON Schema.
//!
//! ```no_run
//! use abeval_harness::config::ConfigLoader;
//!
//! let config = ConfigLoader::load_default().expect("Failed to load config");
//! assert!(config.execution.concurrency_limit >= 1);
//! ```

pub mod error;
pub mod loader;
pub mod validator;

pub use error::{ConfigError, Result};
pub use loader::{
    ConfigLoader, ExecutionConfig, HarnessConfig, LoggingConfig, StatisticsConfig, StorageConfig,
};
pub use validator::SchemaValidator;
