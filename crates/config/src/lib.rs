//! Configuration loading, validation, and management for Storyloom.
//!
//! Loads configuration from `~/.storyloom/config.toml` with environment
//! variable overrides. Validates all settings at load time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.storyloom/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model whose budget is used when none is requested explicitly
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Budget engine settings
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Per-model prompt budgets
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,

    /// Trim aggregation settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_model() -> String {
    "default".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Prompt budget used when the model has no entry in `[models]`
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: i64,

    /// Characters per token assumed by the heuristic estimator
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Share of the budget the must-keep floors may claim before they are scaled down
    #[serde(default = "default_guardrail_ratio")]
    pub guardrail_ratio: f64,

    /// Smallest factor the guardrail may scale a must-keep floor by
    #[serde(default = "default_guardrail_min_scale")]
    pub guardrail_min_scale: f64,

    /// Content characters kept per section when fallback trimming
    #[serde(default = "default_fallback_min_chars")]
    pub fallback_min_chars: usize,

    /// Suffix appended to every shortened section
    #[serde(default = "default_trim_marker")]
    pub trim_marker: String,
}

fn default_max_tokens() -> i64 {
    4096
}
fn default_chars_per_token() -> usize {
    4
}
fn default_guardrail_ratio() -> f64 {
    0.75
}
fn default_guardrail_min_scale() -> f64 {
    0.5
}
fn default_fallback_min_chars() -> usize {
    16
}
fn default_trim_marker() -> String {
    "… [[trimmed]]".into()
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: default_max_tokens(),
            chars_per_token: default_chars_per_token(),
            guardrail_ratio: default_guardrail_ratio(),
            guardrail_min_scale: default_guardrail_min_scale(),
            fallback_min_chars: default_fallback_min_chars(),
            trim_marker: default_trim_marker(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Prompt token budget for this model
    pub max_tokens: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Session aggregates retained before the oldest is evicted
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_true() -> bool {
    true
}
fn default_max_sessions() -> usize {
    1024
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_sessions: default_max_sessions(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Environment overrides (highest priority):
    /// - `STORYLOOM_MAX_TOKENS` replaces `budget.default_max_tokens`
    /// - `STORYLOOM_MODEL` replaces `default_model`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("STORYLOOM_MAX_TOKENS") {
            self.budget.default_max_tokens = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "STORYLOOM_MAX_TOKENS must be an integer, got '{raw}'"
                ))
            })?;
        }

        if let Some(model) = lookup("STORYLOOM_MODEL") {
            self.default_model = model;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".storyloom")
    }

    /// Prompt budget for a model, falling back to `budget.default_max_tokens`.
    pub fn max_tokens_for(&self, model: &str) -> i64 {
        self.models
            .get(model)
            .map(|m| m.max_tokens)
            .unwrap_or(self.budget.default_max_tokens)
    }

    /// Prompt budget for the configured default model.
    pub fn default_budget(&self) -> i64 {
        self.max_tokens_for(&self.default_model)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget.chars_per_token == 0 {
            return Err(ConfigError::ValidationError(
                "budget.chars_per_token must be > 0".into(),
            ));
        }

        if !(self.budget.guardrail_ratio > 0.0 && self.budget.guardrail_ratio <= 1.0) {
            return Err(ConfigError::ValidationError(
                "budget.guardrail_ratio must be in (0.0, 1.0]".into(),
            ));
        }

        if !(self.budget.guardrail_min_scale > 0.0 && self.budget.guardrail_min_scale <= 1.0) {
            return Err(ConfigError::ValidationError(
                "budget.guardrail_min_scale must be in (0.0, 1.0]".into(),
            ));
        }

        if self.budget.trim_marker.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "budget.trim_marker must not be empty".into(),
            ));
        }

        if let Some((name, _)) = self.models.iter().find(|(_, m)| m.max_tokens <= 0) {
            return Err(ConfigError::ValidationError(format!(
                "models.{name}.max_tokens must be > 0"
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            budget: BudgetConfig::default(),
            models: BTreeMap::new(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
