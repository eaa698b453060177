//! Configuration loading
//!
//! Values come from an optional TOML file, overridden by `CTXWIN__*`
//! environment variables (e.g. `CTXWIN__WINDOW__DEFAULT_MAX_TOKENS=4000`).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::context::EvictionStrategy;
use crate::error::{ContextError, Result};

const ENV_PREFIX: &str = "CTXWIN";
const ENV_SEPARATOR: &str = "__";

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub compression: CompressionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load from a config file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the environment only, reading `.env` if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder().add_source(environment()).build()?;
        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window.default_max_tokens == 0 {
            return Err(ContextError::InvalidConfiguration(
                "window.default_max_tokens must be greater than zero".to_string(),
            ));
        }
        if !(self.compression.threshold > 0.0 && self.compression.threshold <= 1.0) {
            return Err(ContextError::InvalidConfiguration(format!(
                "compression.threshold must be in (0, 1], got {}",
                self.compression.threshold
            )));
        }
        Ok(())
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

/// Defaults for windows created without explicit parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: usize,

    #[serde(default = "default_strategy")]
    pub default_strategy: EvictionStrategy,

    /// Model name stamped into new window metadata
    #[serde(default)]
    pub model: Option<String>,
}

fn default_max_tokens() -> usize {
    100_000
}

fn default_strategy() -> EvictionStrategy {
    EvictionStrategy::Adaptive
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_tokens(),
            default_strategy: default_strategy(),
            model: None,
        }
    }
}

/// Item compression settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Compressed text must be shorter than `threshold` x original length
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_true")]
    pub strip_comments: bool,

    #[serde(default = "default_true")]
    pub dedupe_lines: bool,
}

fn default_threshold() -> f64 {
    0.8
}

fn default_true() -> bool {
    true
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            strip_comments: true,
            dedupe_lines: true,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
