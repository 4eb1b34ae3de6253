pub mod budget;
pub mod categories;
pub mod config_cmd;
pub mod estimate;

use std::path::{Path, PathBuf};
use storyloom_budget::{CharRatioEstimator, TokenEstimator};
use storyloom_config::{AppConfig, ConfigError};

/// Load configuration from an explicit path, or the default location.
///
/// Environment overrides apply either way.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env_overrides(|name| std::env::var(name).ok())?;
            config.validate()?;
            Ok(config)
        }
        None => AppConfig::load(),
    }
}

/// Config file location honouring an explicit override.
pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Estimator for a `--tokenizer` path, or the configured character ratio.
pub fn select_estimator(
    config: &AppConfig,
    tokenizer: Option<&Path>,
) -> Result<Box<dyn TokenEstimator>, Box<dyn std::error::Error>> {
    #[cfg(feature = "tokenizer")]
    if let Some(path) = tokenizer {
        let estimator = storyloom_budget::HfTokenizerEstimator::from_file(path)?;
        tracing::info!(path = %path.display(), "Using tokenizer-backed estimation");
        return Ok(Box::new(estimator));
    }

    #[cfg(not(feature = "tokenizer"))]
    if tokenizer.is_some() {
        return Err("Tokenizer support requires the `tokenizer` feature".into());
    }

    Ok(Box::new(CharRatioEstimator::new(config.budget.chars_per_token)))
}
