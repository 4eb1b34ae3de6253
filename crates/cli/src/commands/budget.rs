//! `storyloom budget`: apply a token budget to section files.

use clap::Args;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use storyloom_budget::{
    BudgetEngine, BudgetReport, BudgetRequest, EngineOptions, TextTrimmer, TokenEstimator,
    TrimAction,
};
use storyloom_config::AppConfig;
use storyloom_core::{Category, Section};
use storyloom_telemetry::{TrimSnapshot, TrimTelemetry};

/// Engine over whichever estimator the flags select.
type DynEngine = BudgetEngine<Box<dyn TokenEstimator>>;

#[derive(Args, Debug)]
pub struct BudgetArgs {
    /// Section files: a JSON array, or an object with `linearSections`
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Token budget, overriding both the model and the file
    #[arg(short = 't', long, allow_negative_numbers = true)]
    pub max_tokens: Option<i64>,

    /// Use this model's configured budget
    #[arg(short, long)]
    pub model: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the trimmed prompt after the summary
    #[arg(long)]
    pub render: bool,

    /// Session id that trim telemetry is aggregated under
    #[arg(long, default_value = "cli")]
    pub session: String,

    /// Count tokens with a tokenizer.json instead of the character ratio
    #[cfg(feature = "tokenizer")]
    #[arg(long)]
    pub tokenizer: Option<PathBuf>,
}

/// Accepted shapes of a section file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RequestFile {
    Bare(Vec<Section>),
    Wrapped {
        #[serde(alias = "linearSections")]
        sections: Vec<Section>,
        #[serde(default, alias = "maxTokens")]
        max_tokens: Option<i64>,
    },
}

/// Parse a section file into its sections and optional embedded budget.
pub fn parse_request(content: &str) -> Result<(Vec<Section>, Option<i64>), serde_json::Error> {
    Ok(match serde_json::from_str(content)? {
        RequestFile::Bare(sections) => (sections, None),
        RequestFile::Wrapped {
            sections,
            max_tokens,
        } => (sections, max_tokens),
    })
}

/// Pick the budget: `--max-tokens`, then `--model`, then the file, then
/// the default model.
pub fn resolve_max_tokens(
    flag: Option<i64>,
    model: Option<&str>,
    from_file: Option<i64>,
    config: &AppConfig,
) -> Result<i64, String> {
    if let Some(max_tokens) = flag {
        return Ok(max_tokens);
    }
    if let Some(model) = model {
        return config
            .models
            .get(model)
            .map(|m| m.max_tokens)
            .ok_or_else(|| format!("Unknown model '{model}' (add [models.{model}] to config)"));
    }
    Ok(from_file.unwrap_or_else(|| config.default_budget()))
}

fn build_engine(config: &AppConfig, args: &BudgetArgs) -> Result<DynEngine, Box<dyn std::error::Error>> {
    let estimator = super::select_estimator(config, args.tokenizer_path())?;

    Ok(BudgetEngine::with_estimator(estimator)
        .with_trimmer(TextTrimmer::new(config.budget.trim_marker.clone()))
        .with_options(EngineOptions::from_config(&config.budget)))
}

impl BudgetArgs {
    #[cfg(feature = "tokenizer")]
    fn tokenizer_path(&self) -> Option<&Path> {
        self.tokenizer.as_deref()
    }

    #[cfg(not(feature = "tokenizer"))]
    fn tokenizer_path(&self) -> Option<&Path> {
        None
    }
}

#[derive(Serialize)]
struct FileReport<'a> {
    file: String,
    report: &'a BudgetReport,
}

pub async fn run(args: BudgetArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let engine = build_engine(&config, &args)?;
    let telemetry = TrimTelemetry::from_config(&config.telemetry);

    let mut reports = Vec::with_capacity(args.files.len());
    for file in &args.files {
        let content = tokio::fs::read_to_string(file)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", file.display()))?;
        let (sections, from_file) = parse_request(&content)
            .map_err(|e| format!("Invalid section file {}: {e}", file.display()))?;
        let max_tokens =
            resolve_max_tokens(args.max_tokens, args.model.as_deref(), from_file, &config)?;

        let report = engine.apply(BudgetRequest {
            sections,
            max_tokens,
        })?;
        telemetry.record(&args.session, &report)?;
        reports.push((file, report));
    }

    if args.json {
        let json = match reports.as_slice() {
            [(_, report)] => serde_json::to_string_pretty(report)?,
            many => serde_json::to_string_pretty(
                &many
                    .iter()
                    .map(|(file, report)| FileReport {
                        file: file.display().to_string(),
                        report,
                    })
                    .collect::<Vec<_>>(),
            )?,
        };
        println!("{json}");
        return Ok(());
    }

    for (file, report) in &reports {
        println!("{}", format_summary(&file.display().to_string(), report)?);
        if args.render {
            println!("─────────────────────────────────────");
            println!("{}", report.render("\n\n"));
            println!();
        }
    }

    if reports.len() > 1 {
        println!("{}", format_scope_summary(&telemetry.snapshot())?);
    }

    Ok(())
}

/// Human-readable report.
pub fn format_summary(source: &str, report: &BudgetReport) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let status = if report.within_budget() { "✅" } else { "⛔ over budget" };
    let kept = report.sections.len();
    let dropped = report
        .trims
        .iter()
        .filter(|t| t.action == TrimAction::Dropped)
        .count();
    let shrunk = report.trims.len() - dropped;

    writeln!(out, "📐 Budget: {source}")?;
    writeln!(out, "─────────────────────────────────────")?;
    writeln!(out, "  Mode:      {}", report.mode)?;
    writeln!(out, "  Budget:    {} tokens", report.max_tokens)?;
    writeln!(out, "  Before:    {} tokens", report.total_tokens_before)?;
    writeln!(out, "  After:     {} tokens {status}", report.total_tokens_after)?;
    writeln!(out, "  Sections:  {kept} kept, {dropped} dropped, {shrunk} shrunk")?;

    if !report.trims.is_empty() {
        writeln!(out)?;
        writeln!(out, "  Trims (in order applied):")?;
        for trim in &report.trims {
            match trim.action {
                TrimAction::Dropped => writeln!(
                    out,
                    "    dropped  {:<32} -{} tokens",
                    trim.key, trim.removed_tokens
                )?,
                TrimAction::Shrunk => writeln!(
                    out,
                    "    shrunk   {:<32} -{} tokens → {} chars",
                    trim.key, trim.removed_tokens, trim.resulting_length
                )?,
            }
        }
    }

    if !report.warnings.is_empty() {
        writeln!(out)?;
        for warning in &report.warnings {
            writeln!(out, "  ⚠️  {warning}")?;
        }
    }

    Ok(out)
}

/// Removed tokens per category across all recorded runs.
pub fn format_scope_summary(snapshot: &TrimSnapshot) -> Result<String, fmt::Error> {
    let mut out = String::new();
    let totals = &snapshot.totals;

    writeln!(out, "📊 Removed by category ({} runs)", totals.runs)?;
    writeln!(out, "─────────────────────────────────────")?;
    for category in Category::ALL {
        let removed = totals.removed_for(category);
        if removed > 0 {
            writeln!(out, "  {:<10} {removed} tokens", category.as_str())?;
        }
    }
    writeln!(out, "  {:<10} {} tokens", "total", totals.removed_tokens)?;
    if totals.fallback_runs > 0 {
        writeln!(
            out,
            "  Fallback runs: {} ({} unsatisfiable)",
            totals.fallback_runs, totals.unsatisfiable_runs
        )?;
    }
    Ok(out)
}
