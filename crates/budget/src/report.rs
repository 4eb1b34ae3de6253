//! Budget report types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use storyloom_core::{Category, Section};

/// Emitted once when must-keep floors were ignored to reach the budget.
pub const FALLBACK_TRIM_APPLIED: &str = "fallback_trim_applied";

/// Emitted when the must-keep `min_chars` floors claim too much of the budget.
pub const MIN_CHARS_GUARDRAIL: &str = "min_chars sum exceeds budget guardrail";

/// Emitted when even fallback trimming left the prompt over budget.
pub const BUDGET_UNSATISFIABLE: &str = "budget_unsatisfiable";

/// Which allocation mode a run ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMode {
    /// Already within budget.
    Unchanged,
    /// Category/priority ordered drop-or-shrink respecting floors.
    NormalTrim,
    /// Floors ignored; must-keep sections shrunk to the hard minimum.
    FallbackTrim,
}

impl std::fmt::Display for BudgetMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::NormalTrim => write!(f, "normal_trim"),
            Self::FallbackTrim => write!(f, "fallback_trim"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimAction {
    Dropped,
    Shrunk,
}

/// One modified or dropped section, in the order trims were applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimRecord {
    pub key: String,
    pub category: Category,
    pub action: TrimAction,
    /// Estimated tokens removed from this section, cumulative.
    pub removed_tokens: usize,
    /// Character length of the remaining text (0 when dropped).
    pub resulting_length: usize,
}

/// Output of one allocation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetReport {
    /// Surviving sections in input order.
    pub sections: Vec<Section>,
    pub trims: Vec<TrimRecord>,
    pub warnings: Vec<String>,
    pub total_tokens_before: usize,
    pub total_tokens_after: usize,
    pub max_tokens: i64,
    pub mode: BudgetMode,
}

impl BudgetReport {
    pub(crate) fn unchanged(sections: Vec<Section>, total_tokens: usize, max_tokens: i64) -> Self {
        Self {
            sections,
            trims: Vec::new(),
            warnings: Vec::new(),
            total_tokens_before: total_tokens,
            total_tokens_after: total_tokens,
            max_tokens,
            mode: BudgetMode::Unchanged,
        }
    }

    pub fn within_budget(&self) -> bool {
        i64::try_from(self.total_tokens_after).is_ok_and(|after| after <= self.max_tokens)
    }

    pub fn tokens_removed(&self) -> usize {
        self.total_tokens_before
            .saturating_sub(self.total_tokens_after)
    }

    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|w| w == code)
    }

    pub fn fallback_applied(&self) -> bool {
        self.mode == BudgetMode::FallbackTrim
    }

    /// Removed tokens summed per category.
    pub fn removed_by_category(&self) -> BTreeMap<Category, usize> {
        let mut by_category = BTreeMap::new();
        for trim in &self.trims {
            *by_category.entry(trim.category).or_insert(0) += trim.removed_tokens;
        }
        by_category
    }

    /// Join the surviving section texts into the final prompt body.
    pub fn render(&self, separator: &str) -> String {
        self.sections
            .iter()
            .filter(|s| !s.text.is_empty())
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> BudgetReport {
        BudgetReport {
            sections: vec![
                Section::new("core.rules", "Rules", "Be fair."),
                Section::new("input.player", "Player", ""),
                Section::new("world.tone", "Tone", "Grim."),
            ],
            trims: vec![
                TrimRecord {
                    key: "npcs.bio".into(),
                    category: Category::Npcs,
                    action: TrimAction::Dropped,
                    removed_tokens: 40,
                    resulting_length: 0,
                },
                TrimRecord {
                    key: "npcs.rival".into(),
                    category: Category::Npcs,
                    action: TrimAction::Shrunk,
                    removed_tokens: 10,
                    resulting_length: 30,
                },
                TrimRecord {
                    key: "world.tone".into(),
                    category: Category::World,
                    action: TrimAction::Shrunk,
                    removed_tokens: 5,
                    resulting_length: 5,
                },
            ],
            warnings: vec![FALLBACK_TRIM_APPLIED.into()],
            total_tokens_before: 100,
            total_tokens_after: 45,
            max_tokens: 50,
            mode: BudgetMode::FallbackTrim,
        }
    }

    #[test]
    fn removed_by_category_sums() {
        let by_cat = report().removed_by_category();
        assert_eq!(by_cat.get(&Category::Npcs), Some(&50));
        assert_eq!(by_cat.get(&Category::World), Some(&5));
        assert_eq!(by_cat.get(&Category::Core), None);
    }

    #[test]
    fn helpers_reflect_totals() {
        let r = report();
        assert!(r.within_budget());
        assert_eq!(r.tokens_removed(), 55);
        assert!(r.has_warning(FALLBACK_TRIM_APPLIED));
        assert!(r.fallback_applied());
    }

    #[test]
    fn negative_budget_is_never_met() {
        let mut r = report();
        r.max_tokens = -1;
        r.total_tokens_after = 0;
        assert!(!r.within_budget());
    }

    #[test]
    fn render_skips_empty_sections() {
        assert_eq!(report().render("\n\n"), "Be fair.\n\nGrim.");
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&report()).unwrap();
        assert!(json.contains(r#""mode":"fallback_trim""#));
        assert!(json.contains(r#""action":"dropped""#));
        assert!(json.contains(r#""total_tokens_before":100"#));
    }
}
