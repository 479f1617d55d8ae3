//! Pipeline configuration.
//!
//! Configuration is a plain serde struct with defaults for every field,
//! so an empty JSON object is a valid config. Selected fields can be
//! overridden from the environment with the `AGENTFLOW_` prefix.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding `max_reasoning_iterations`.
pub const ENV_MAX_ITERATIONS: &str = "AGENTFLOW_MAX_REASONING_ITERATIONS";
/// Environment variable overriding `default_mode_key`.
pub const ENV_DEFAULT_MODE: &str = "AGENTFLOW_DEFAULT_MODE";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "AGENTFLOW_LOG_LEVEL";
/// Environment variable overriding `logging.format`.
pub const ENV_LOG_FORMAT: &str = "AGENTFLOW_LOG_FORMAT";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("could not read config file `{path}`: {source}")]
    ReadFile {
        /// The path that was read.
        path: PathBuf,
        /// The I/O error.
        source: std::io::Error,
    },
    /// The config text was not valid JSON for this schema.
    #[error("could not parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// An environment override had an unusable value.
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride {
        /// The variable name.
        key: String,
        /// The rejected value.
        value: String,
    },
    /// A value is out of range.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Single-line human format.
    #[default]
    Compact,
    /// Multi-line human format.
    Pretty,
    /// Structured JSON lines.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Repeat-call guard thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopGuardConfig {
    /// Repeat count at which a warning is injected into the prompt.
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: u32,
    /// Repeat count at which the call is suppressed.
    #[serde(default = "default_suppress_threshold")]
    pub suppress_threshold: u32,
    /// Remaining iterations the model is told it has once suppression kicks in.
    #[serde(default = "default_force_finalize_remaining")]
    pub force_finalize_remaining: u32,
}

impl Default for LoopGuardConfig {
    fn default() -> Self {
        Self {
            warn_threshold: default_warn_threshold(),
            suppress_threshold: default_suppress_threshold(),
            force_finalize_remaining: default_force_finalize_remaining(),
        }
    }
}

/// Workflow narration messages sent at the start of each chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationConfig {
    /// Sent when a new session is started.
    #[serde(default = "default_initial_narration")]
    pub initial: String,
    /// Sent when an existing session is resumed.
    #[serde(default = "default_follow_on_narration")]
    pub follow_on: String,
    /// Sent when client tool results are submitted.
    #[serde(default = "default_continuation_narration")]
    pub continuation: String,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            initial: default_initial_narration(),
            follow_on: default_follow_on_narration(),
            continuation: default_continuation_narration(),
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on reasoner iterations.
    #[serde(default = "default_max_reasoning_iterations")]
    pub max_reasoning_iterations: usize,
    /// Mode key ensured on every agent context.
    #[serde(default = "default_mode_key")]
    pub default_mode_key: String,
    /// KFR branch used when a session has none.
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Truncation bound for turn summaries.
    #[serde(default = "default_answer_summary_max_chars")]
    pub answer_summary_max_chars: usize,
    /// Repeat-call guard.
    #[serde(default)]
    pub loop_guard: LoopGuardConfig,
    /// Workflow narration.
    #[serde(default)]
    pub narration: NarrationConfig,
    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_max_reasoning_iterations() -> usize {
    4
}

fn default_mode_key() -> String {
    "general".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_answer_summary_max_chars() -> usize {
    512
}

fn default_warn_threshold() -> u32 {
    2
}

fn default_suppress_threshold() -> u32 {
    3
}

fn default_force_finalize_remaining() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_initial_narration() -> String {
    "Finding the next available agent...".to_string()
}

fn default_follow_on_narration() -> String {
    "Welcome Back...".to_string()
}

fn default_continuation_narration() -> String {
    "Tool results received, resuming tool execution...".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_reasoning_iterations: default_max_reasoning_iterations(),
            default_mode_key: default_mode_key(),
            default_branch: default_branch(),
            answer_summary_max_chars: default_answer_summary_max_chars(),
            loop_guard: LoopGuardConfig::default(),
            narration: NarrationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a JSON config string.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Loads from an optional file, applies environment overrides and validates.
    ///
    /// A missing path yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        use anyhow::Context as _;

        let mut config = match path {
            Some(path) => Self::from_file(path)
                .with_context(|| format!("loading pipeline config from {}", path.display()))?,
            None => Self::default(),
        };
        config
            .apply_env_overrides(|key| std::env::var(key).ok())
            .context("applying environment overrides")?;
        config.validate().context("validating pipeline config")?;
        Ok(config)
    }

    /// Applies `AGENTFLOW_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_ITERATIONS) {
            self.max_reasoning_iterations =
                value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: ENV_MAX_ITERATIONS.to_string(),
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup(ENV_DEFAULT_MODE) {
            self.default_mode_key = value.trim().to_string();
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = value.trim().to_string();
        }
        if let Some(value) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = value.parse().map_err(|()| ConfigError::InvalidEnvOverride {
                key: ENV_LOG_FORMAT.to_string(),
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    /// Rejects out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_reasoning_iterations == 0 {
            return Err(ConfigError::Validation(
                "max_reasoning_iterations must be at least 1".to_string(),
            ));
        }
        if self.loop_guard.warn_threshold == 0 {
            return Err(ConfigError::Validation(
                "loop_guard.warn_threshold must be at least 1".to_string(),
            ));
        }
        if self.loop_guard.suppress_threshold <= self.loop_guard.warn_threshold {
            return Err(ConfigError::Validation(
                "loop_guard.suppress_threshold must be greater than warn_threshold".to_string(),
            ));
        }
        if self.default_mode_key.trim().is_empty() {
            return Err(ConfigError::Validation("default_mode_key must not be empty".to_string()));
        }
        if self.default_branch.trim().is_empty() {
            return Err(ConfigError::Validation("default_branch must not be empty".to_string()));
        }
        Ok(())
    }

    /// Sets the reasoner iteration bound.
    #[must_use]
    pub fn with_max_reasoning_iterations(mut self, max: usize) -> Self {
        self.max_reasoning_iterations = max;
        self
    }

    /// Sets the repeat-call guard thresholds.
    #[must_use]
    pub fn with_loop_guard(mut self, loop_guard: LoopGuardConfig) -> Self {
        self.loop_guard = loop_guard;
        self
    }
}
