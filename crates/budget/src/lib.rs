//! # Storyloom Budget
//!
//! Fits a list of prompt sections into a token budget.
//!
//! The engine drops and shrinks sections in a deterministic order
//! (category precedence, then priority, then input position) and reports
//! exactly what it changed. Must-keep sections are only ever shrunk,
//! never dropped, and shrinking never splits a fenced code block.
//!
//! ```
//! use storyloom_budget::apply_budget;
//! use storyloom_core::{Constraint, Section};
//!
//! let sections = vec![
//!     Section::new("ruleset.principles", "Principles", "r".repeat(1000))
//!         .with_constraint(Constraint::must_keep(Some(120), Some(90))),
//!     Section::new("world.tone", "Tone", "w".repeat(1000)),
//! ];
//! let report = apply_budget(sections, 200).unwrap();
//!
//! assert_eq!(report.trims[0].key, "world.tone");
//! assert!(report.total_tokens_after <= 200);
//! ```

pub mod engine;
pub mod report;
pub mod token;
pub mod trim;

pub use engine::{BudgetEngine, BudgetRequest, EngineOptions, apply_budget};
pub use report::{
    BUDGET_UNSATISFIABLE, BudgetMode, BudgetReport, FALLBACK_TRIM_APPLIED, MIN_CHARS_GUARDRAIL,
    TrimAction, TrimRecord,
};
pub use token::{CharRatioEstimator, TokenEstimator, estimate_sections, estimate_tokens};
pub use trim::{TRIM_MARKER, TextTrimmer, fence_count};

#[cfg(feature = "tokenizer")]
pub use token::{HfTokenizerEstimator, TokenizerLoadError};
