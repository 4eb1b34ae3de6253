//! `storyloom estimate`: token estimate for a piece of text.

use clap::Args;
use std::path::{Path, PathBuf};
use storyloom_budget::TokenEstimator;

#[derive(Args, Debug)]
pub struct EstimateArgs {
    /// Text to estimate
    #[arg(conflicts_with = "file", required_unless_present = "file")]
    pub text: Option<String>,

    /// Read the text from a file instead
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Count tokens with a tokenizer.json instead of the character ratio
    #[cfg(feature = "tokenizer")]
    #[arg(long)]
    pub tokenizer: Option<PathBuf>,
}

impl EstimateArgs {
    #[cfg(feature = "tokenizer")]
    fn tokenizer_path(&self) -> Option<&Path> {
        self.tokenizer.as_deref()
    }

    #[cfg(not(feature = "tokenizer"))]
    fn tokenizer_path(&self) -> Option<&Path> {
        None
    }
}

pub async fn run(args: EstimateArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let estimator = super::select_estimator(&config, args.tokenizer_path())?;
    let method = match args.tokenizer_path() {
        Some(path) => format!("tokenizer {}", path.display()),
        None => format!("{} chars/token", config.budget.chars_per_token),
    };

    let text = match (args.text, args.file) {
        (_, Some(file)) => tokio::fs::read_to_string(&file)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", file.display()))?,
        (Some(text), None) => text,
        (None, None) => return Err("Provide text or --file".into()),
    };

    println!("{}", describe(estimator.as_ref(), &method, &text));
    Ok(())
}

fn describe(estimator: &dyn TokenEstimator, method: &str, text: &str) -> String {
    format!(
        "{} tokens ({} chars, {method})",
        estimator.estimate(text),
        text.chars().count(),
    )
}
