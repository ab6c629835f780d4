//! Configuration loading and typed config structures for Phenowatch.
//!
//! The canonical configuration lives in `phenowatch-config.yaml` at the
//! project root. Every field has a default, so an empty file (or no file at
//! all) yields the stock thresholds: `leafArea` 50, `stemHeight` 30 and
//! `chlorophyllContent` 5, with every parameter starting at zero.

use std::collections::BTreeMap;
use std::path::Path;

use phenowatch_types::{CHLOROPHYLL_CONTENT, DEFAULT_PARAMETERS, LEAF_AREA, STEM_HEIGHT};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Environment variable that overrides `logging.level`.
pub const LOG_LEVEL_ENV: &str = "PHENOWATCH_LOG_LEVEL";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration, mirroring `phenowatch-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PhenowatchConfig {
    /// Threshold tracker parameters.
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Change tracking stage settings.
    #[serde(default)]
    pub changes: ChangeConfig,

    /// Pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PhenowatchConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `PHENOWATCH_LOG_LEVEL` overrides `logging.level` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.logging.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document means "all defaults".
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }
}

/// Threshold tracker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrackerConfig {
    /// Recognised parameters and their starting values.
    #[serde(default = "default_initial")]
    pub initial: BTreeMap<String, Decimal>,

    /// Per-parameter notification thresholds.
    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, Decimal>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            initial: default_initial(),
            thresholds: default_thresholds(),
        }
    }
}

/// Change tracking stage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeConfig {
    /// Minimum absolute delta that counts as a significant change.
    #[serde(default = "default_significance")]
    pub significance: Decimal,
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self {
            significance: default_significance(),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineConfig {
    /// Deadline for one whole pipeline run, applied by the caller.
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            run_timeout_ms: default_run_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Apply `PHENOWATCH_LOG_LEVEL` if it is set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV)
            && !level.trim().is_empty()
        {
            self.level = level;
        }
    }
}

fn default_initial() -> BTreeMap<String, Decimal> {
    DEFAULT_PARAMETERS
        .iter()
        .map(|name| ((*name).to_owned(), Decimal::ZERO))
        .collect()
}

fn default_thresholds() -> BTreeMap<String, Decimal> {
    BTreeMap::from([
        (LEAF_AREA.to_owned(), Decimal::from(50)),
        (STEM_HEIGHT.to_owned(), Decimal::from(30)),
        (CHLOROPHYLL_CONTENT.to_owned(), Decimal::from(5)),
    ])
}

fn default_significance() -> Decimal {
    Decimal::from(5)
}

const fn default_run_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_owned()
}
