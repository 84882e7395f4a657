use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

use crate::config::error::{ConfigError, Result};
use crate::config::loader::HarnessConfig;

/// Schema validator for `HarnessConfig`
pub struct SchemaValidator {
    schema: JSONSchema,
}

impl SchemaValidator {
    /// Compile the schema embedded at build time
    pub fn new() -> Result<Self> {
        let schema_str = include_str!("schemas/harness_config.schema.json");
        let schema_value: Value = serde_json::from_str(schema_str).map_err(|e| {
            ConfigError::SchemaValidationError(format!("Failed to parse harness schema: {e}"))
        })?;

        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema_value)
            .map_err(|e| {
                ConfigError::SchemaValidationError(format!("Failed to compile harness schema: {e}"))
            })?;

        Ok(Self { schema })
    }

    /// Validate a config, reporting every violation at once
    pub fn validate(&self, config: &HarnessConfig) -> Result<()> {
        let value = serde_json::to_value(config).map_err(|e| {
            ConfigError::SchemaValidationError(format!("Failed to serialize config: {e}"))
        })?;

        if let Err(errors) = self.schema.validate(&value) {
            let messages: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    let path = if path.is_empty() {
                        "root".to_string()
                    } else {
                        path
                    };
                    format!("{e} at '{path}'")
                })
                .collect();

            return Err(ConfigError::SchemaValidationError(format!(
                "Configuration validation failed ({} error{}):\n  - {}",
                messages.len(),
                if messages.len() == 1 { "" } else { "s" },
                messages.join("\n  - ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SchemaValidator {
        SchemaValidator::new().expect("schema compiles")
    }

    #[test]
    fn test_default_config_is_valid() {
        let result = validator().validate(&HarnessConfig::default());
        assert!(result.is_ok(), "default config should be valid: {result:?}");
    }

    #[test]
    fn test_jitter_out_of_range() {
        let mut config = HarnessConfig::default();
        config.retry.jitter_factor = 1.5;
        let err = validator().validate(&config).unwrap_err().to_string();
        assert!(err.contains("jitter_factor"), "got: {err}");
        assert!(err.contains("(1 error)"), "got: {err}");
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = HarnessConfig::default();
        config.retry.max_attempts = 0;
        let err = validator().validate(&config).unwrap_err().to_string();
        assert!(err.contains("max_attempts"), "got: {err}");
    }

    #[test]
    fn test_backoff_multiplier_below_one_rejected() {
        let mut config = HarnessConfig::default();
        config.retry.backoff_multiplier = 0.5;
        assert!(validator().validate(&config).is_err());
    }

    #[test]
    fn test_t_test_minimum_must_allow_two_samples() {
        let mut config = HarnessConfig::default();
        config.statistics.min_t_test_samples = 1;
        let err = validator().validate(&config).unwrap_err().to_string();
        assert!(err.contains("min_t_test_samples"), "got: {err}");
    }

    #[test]
    fn test_empty_root_dir_rejected() {
        let mut config = HarnessConfig::default();
        config.storage.root_dir = std::path::PathBuf::new();
        assert!(validator().validate(&config).is_err());
    }
}
