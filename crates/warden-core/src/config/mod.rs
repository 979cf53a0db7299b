//! Configuration types for Warden.
//!
//! Configuration is loaded from a single YAML file (`warden.yaml`). Every
//! section is optional and falls back to its defaults.
//!
//! ```yaml
//! execution:
//!   max_concurrency: 8
//!   invoke_timeout_secs: 30
//!   dry_run: false
//! provider:
//!   name: huaweicloud
//!   region: ap-southeast-1
//! logging:
//!   level: info
//! ```

pub mod execution;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use execution::ExecutionConfig;

/// Complete Warden configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Concurrency, timeout and dry-run settings.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Provider metadata handed to the client layer.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Logging settings for the binary.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Provider metadata. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name.
    #[serde(default = "default_provider")]
    pub name: String,

    /// Region the client targets.
    #[serde(default)]
    pub region: Option<String>,

    /// Project (account) the client acts in.
    #[serde(default)]
    pub project_id: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider(),
            region: None,
            project_id: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_provider() -> String {
    "huaweicloud".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

/// Error type for configuration and policy file loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WardenConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = WardenConfig::from_yaml("{}").unwrap();
        assert_eq!(config, WardenConfig::default());
        assert_eq!(config.execution.max_concurrency, 8);
        assert_eq!(config.provider.name, "huaweicloud");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_sections() {
        let yaml = r#"
execution:
  max_concurrency: 2
  dry_run: true
provider:
  region: ap-southeast-1
"#;
        let config = WardenConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.execution.max_concurrency, 2);
        assert_eq!(config.execution.invoke_timeout_secs, 30);
        assert!(config.execution.dry_run);
        assert_eq!(config.provider.region.as_deref(), Some("ap-southeast-1"));
        assert_eq!(config.provider.name, "huaweicloud");
    }

    #[test]
    fn test_missing_file() {
        let err = WardenConfig::from_file("/nonexistent/warden.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
