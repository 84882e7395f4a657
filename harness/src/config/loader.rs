use std::path::{Path, PathBuf};
use std::time::Duration;

use abeval_stats::SignificanceConfig;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::config::error::{ConfigError, Result};
use crate::config::validator::SchemaValidator;
use crate::retry::RetryPolicy;

/// Root harness configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Retry policy applied to every single-agent invocation
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub statistics: StatisticsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum question evaluations in flight at once
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Per-invocation timeout; distinct from retry backoff
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// p-value below which a difference is significant
    #[serde(default = "default_significance_threshold")]
    pub significance_threshold: f64,

    /// Paired samples required before the t-test decides the verdict
    #[serde(default = "default_min_t_test_samples")]
    pub min_t_test_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per run
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Append each finished trial to the run journal while executing
    #[serde(default = "default_true")]
    pub journal: bool,

    /// Write `results.csv` next to `run.json` on persist
    #[serde(default = "default_true")]
    pub export_csv: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_concurrency_limit() -> usize {
    4
}
fn default_timeout_ms() -> u64 {
    60_000
}
fn default_significance_threshold() -> f64 {
    0.05
}
fn default_min_t_test_samples() -> usize {
    8
}
fn default_root_dir() -> PathBuf {
    PathBuf::from("abeval-runs")
}
fn default_true() -> bool {
    true
}
fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            significance_threshold: default_significance_threshold(),
            min_t_test_samples: default_min_t_test_samples(),
        }
    }
}

impl StatisticsConfig {
    pub fn significance(&self) -> SignificanceConfig {
        SignificanceConfig {
            alpha: self.significance_threshold,
            min_t_test_samples: self.min_t_test_samples,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            journal: default_true(),
            export_csv: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Configuration loader with layered merging support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration with layered merging:
    /// 1. Start with defaults
    /// 2. Merge config file if provided
    /// 3. Override with environment variables (ABEVAL_ prefix)
    pub fn load(&self) -> Result<HarnessConfig> {
        let mut builder = Config::builder();

        let defaults_json = serde_json::to_string(&HarnessConfig::default())?;
        builder = builder.add_source(File::from_str(&defaults_json, config::FileFormat::Json));

        if let Some(ref path) = self.config_path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            builder = builder.add_source(File::from(path.as_ref()));
        }

        // Example: ABEVAL_EXECUTION__CONCURRENCY_LIMIT=8
        builder = builder.add_source(
            Environment::with_prefix("ABEVAL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let merged = builder.build()?;
        let config: HarnessConfig = merged
            .try_deserialize()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        SchemaValidator::new()?.validate(&config)?;
        tracing::debug!(
            path = ?self.config_path,
            concurrency_limit = config.execution.concurrency_limit,
            max_attempts = config.retry.max_attempts,
            "Loaded harness configuration"
        );
        Ok(config)
    }

    /// Locate the config file in standard locations:
    /// 1. Current directory: ./abeval.toml
    /// 2. XDG config: ~/.config/abeval/config.toml
    /// 3. Home directory: ~/.abeval.toml
    pub fn find_config_file() -> Option<PathBuf> {
        let cwd_config = PathBuf::from("./abeval.toml");
        if cwd_config.exists() {
            return Some(cwd_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("abeval").join("config.toml");
            if xdg_config.exists() {
                return Some(xdg_config);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_config = home_dir.join(".abeval.toml");
            if home_config.exists() {
                return Some(home_config);
            }
        }

        None
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<HarnessConfig> {
        let loader = match Self::find_config_file() {
            Some(path) => ConfigLoader::new().with_file(path),
            None => ConfigLoader::new(),
        };
        loader.load()
    }
}
