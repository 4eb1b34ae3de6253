//! `storyloom config`: configuration management commands.

use std::path::Path;
use storyloom_config::AppConfig;

pub async fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match super::load_config(config_path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = advisories(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Default model:  {}", config.default_model);
            println!("   Default budget: {} tokens", config.default_budget());
            println!("   Chars/token:    {}", config.budget.chars_per_token);
            println!("   Models:         {}", config.models.len());
            println!(
                "   Telemetry:      {}",
                if config.telemetry.enabled { "on" } else { "off" }
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Settings that load fine but are probably mistakes.
fn advisories(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.default_model != "default" && !config.models.contains_key(&config.default_model) {
        warnings.push(format!(
            "default_model '{}' has no [models] entry; using budget.default_max_tokens",
            config.default_model
        ));
    }

    if config.budget.default_max_tokens <= 0 {
        warnings.push("budget.default_max_tokens <= 0 forces fallback trimming on every run".into());
    }

    if config.budget.fallback_min_chars == 0 {
        warnings.push("budget.fallback_min_chars = 0 lets fallback reduce sections to the marker alone".into());
    }

    warnings
}

pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", super::config_file(config_path).display());
    Ok(())
}

pub async fn init(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = super::config_file(config_path);
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )
        .into());
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, AppConfig::default_toml()).await?;
    println!("✅ Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn default_config_has_no_advisories() {
        assert!(advisories(&AppConfig::default()).is_empty());
    }

    #[test]
    fn unknown_default_model_is_flagged() {
        let config = AppConfig {
            default_model: "gpt-huge".into(),
            ..AppConfig::default()
        };
        let warnings = advisories(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("gpt-huge"));
    }

    #[tokio::test]
    async fn init_writes_loadable_file_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        init(Some(&path), false).await.unwrap();
        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.budget.default_max_tokens, 4096);

        assert!(init(Some(&path), false).await.is_err());
        assert!(init(Some(&path), true).await.is_ok());
    }
}
