//! Configuration management for droplimit.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DroplimitError, Result};
use crate::ratelimit::{
    with_max_tokens, with_max_tokens_for, with_target_rate, with_wait_timeout,
    with_wake_interval, LimiterOption, LocalLimiter,
};

/// Main configuration file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DroplimitConfig {
    /// Local limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Limiter section. Unset values fall back to the limiter defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Tokens produced per second
    #[serde(default)]
    pub target_rate: Option<f64>,

    /// Time between generator iterations in milliseconds
    #[serde(default)]
    pub wake_interval_ms: Option<u64>,

    /// Time a caller waits for a token in milliseconds
    #[serde(default)]
    pub wait_timeout_ms: Option<u64>,

    /// Absolute maximum of buffered tokens
    #[serde(default)]
    pub max_tokens: Option<usize>,

    /// Maximum of buffered tokens, expressed as the tokens produced at the
    /// target rate over this many milliseconds
    #[serde(default)]
    pub max_tokens_interval_ms: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON formatted log lines
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

fn default_log_level() -> String {
    "info".to_string()
}

impl DroplimitConfig {
    /// Load configuration from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| DroplimitError::Config(format!("Failed to parse configuration: {}", e)))
    }
}

impl LimiterConfig {
    /// Convert this section into limiter options.
    ///
    /// The target rate always precedes an interval based capacity, so the
    /// capacity is computed from the configured rate.
    pub fn to_options(&self) -> Result<Vec<LimiterOption>> {
        if self.max_tokens.is_some() && self.max_tokens_interval_ms.is_some() {
            return Err(DroplimitError::Config(
                "max_tokens and max_tokens_interval_ms are mutually exclusive".to_string(),
            ));
        }

        let mut options = Vec::new();

        if let Some(rate) = self.target_rate {
            options.push(with_target_rate(rate));
        }
        if let Some(ms) = self.wake_interval_ms {
            options.push(with_wake_interval(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.wait_timeout_ms {
            options.push(with_wait_timeout(Duration::from_millis(ms)));
        }
        if let Some(max) = self.max_tokens {
            options.push(with_max_tokens(max));
        }
        if let Some(ms) = self.max_tokens_interval_ms {
            options.push(with_max_tokens_for(Duration::from_millis(ms)));
        }

        Ok(options)
    }

    /// Build a limiter from this section.
    pub fn build(&self) -> Result<LocalLimiter> {
        LocalLimiter::new(self.to_options()?)
    }
}
