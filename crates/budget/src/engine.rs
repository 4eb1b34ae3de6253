//! Budget allocation engine.
//!
//! Reduces an ordered list of prompt sections until their estimated token
//! total fits a budget. Sections are visited in category precedence order
//! (`input` first, `core` last), then by ascending priority, then by input
//! position. The run moves through three modes, each more aggressive than
//! the last and entered only when the previous one left the total over
//! budget:
//!
//! 1. **Unchanged**: the total already fits; nothing is touched.
//! 2. **Normal trim**: droppable sections are removed; must-keep sections
//!    are shrunk, but never below their `min_chars` floor.
//! 3. **Fallback trim**: floors are ignored and must-keep sections shrink
//!    to a hard minimum of a few characters plus the trim marker.
//!
//! Before normal trimming, a guardrail compares the summed must-keep floors
//! against a share of the budget and scales them down for the run when they
//! claim too much.
//!
//! # Determinism
//!
//! The engine holds no mutable state. Identical inputs produce identical
//! reports, and one engine may serve any number of threads.

use crate::report::{
    BUDGET_UNSATISFIABLE, BudgetMode, BudgetReport, FALLBACK_TRIM_APPLIED, MIN_CHARS_GUARDRAIL,
    TrimAction, TrimRecord,
};
use crate::token::{CharRatioEstimator, TokenEstimator};
use crate::trim::TextTrimmer;
use serde::{Deserialize, Serialize};
use storyloom_config::BudgetConfig;
use storyloom_core::{BudgetError, Section};
use tracing::{debug, warn};

// ── Types ─────────────────────────────────────────────────────────────────

/// Tunables for the allocation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    /// Share of the budget that must-keep floors may claim.
    pub guardrail_ratio: f64,
    /// Lower bound on the factor the guardrail scales floors by.
    pub guardrail_min_scale: f64,
    /// Content characters kept per must-keep section in fallback.
    pub fallback_min_chars: usize,
}

impl EngineOptions {
    pub fn from_config(config: &BudgetConfig) -> Self {
        Self {
            guardrail_ratio: config.guardrail_ratio,
            guardrail_min_scale: config.guardrail_min_scale,
            fallback_min_chars: config.fallback_min_chars,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            guardrail_ratio: 0.75,
            guardrail_min_scale: 0.5,
            fallback_min_chars: 16,
        }
    }
}

/// A single allocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRequest {
    #[serde(alias = "linearSections", alias = "linear_sections")]
    pub sections: Vec<Section>,
    #[serde(alias = "maxTokens")]
    pub max_tokens: i64,
}

/// Trimming state threaded through the reduction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrimPass {
    /// Must-keep sections stop at their floor.
    Normal,
    /// Must-keep sections stop at the hard minimum.
    Fallback,
}

struct Entry {
    section: Section,
    tokens: usize,
    dropped: bool,
    /// Normal-mode character floor.
    floor: usize,
    /// Index of this section's trim record, once it has one.
    record: Option<usize>,
}

struct Run {
    entries: Vec<Entry>,
    trims: Vec<TrimRecord>,
    total: usize,
    max_tokens: i64,
}

impl Run {
    /// Tokens still above budget.
    fn excess(&self) -> usize {
        let over = self.total as i128 - self.max_tokens as i128;
        usize::try_from(over.max(0)).unwrap_or(usize::MAX)
    }

    fn over_budget(&self) -> bool {
        self.excess() > 0
    }

    fn drop_entry(&mut self, idx: usize) {
        let entry = &mut self.entries[idx];
        let removed = entry.tokens;
        entry.dropped = true;
        entry.tokens = 0;
        self.total -= removed;
        debug!(
            key = %entry.section.key,
            removed_tokens = removed,
            total_tokens = self.total,
            "Dropped section"
        );
        self.record(idx, TrimAction::Dropped, removed);
    }

    fn replace_text(&mut self, idx: usize, text: String, tokens: usize) {
        let entry = &mut self.entries[idx];
        let removed = entry.tokens - tokens;
        entry.section.text = text;
        entry.tokens = tokens;
        self.total -= removed;
        debug!(
            key = %entry.section.key,
            removed_tokens = removed,
            resulting_length = entry.section.char_len(),
            total_tokens = self.total,
            "Shrunk section"
        );
        self.record(idx, TrimAction::Shrunk, removed);
    }

    /// One record per section, at the position of its first trim.
    fn record(&mut self, idx: usize, action: TrimAction, removed: usize) {
        let entry = &mut self.entries[idx];
        let resulting_length = if entry.dropped {
            0
        } else {
            entry.section.char_len()
        };

        match entry.record {
            Some(i) => {
                let record = &mut self.trims[i];
                record.action = action;
                record.removed_tokens += removed;
                record.resulting_length = resulting_length;
            }
            None => {
                entry.record = Some(self.trims.len());
                self.trims.push(TrimRecord {
                    key: entry.section.key.clone(),
                    category: entry.section.category(),
                    action,
                    removed_tokens: removed,
                    resulting_length,
                });
            }
        }
    }
}

// ── Engine ────────────────────────────────────────────────────────────────

/// The budget allocation engine. Stateless, so create one and reuse it.
#[derive(Debug, Clone)]
pub struct BudgetEngine<E = CharRatioEstimator> {
    estimator: E,
    trimmer: TextTrimmer,
    options: EngineOptions,
}

impl BudgetEngine<CharRatioEstimator> {
    /// Create an engine with the heuristic estimator and default options.
    pub fn new() -> Self {
        Self::with_estimator(CharRatioEstimator::default())
    }

    /// Create an engine from the `[budget]` configuration table.
    pub fn from_config(config: &BudgetConfig) -> Self {
        Self::with_estimator(CharRatioEstimator::new(config.chars_per_token))
            .with_trimmer(TextTrimmer::new(config.trim_marker.clone()))
            .with_options(EngineOptions::from_config(config))
    }
}

impl Default for BudgetEngine<CharRatioEstimator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: TokenEstimator> BudgetEngine<E> {
    pub fn with_estimator(estimator: E) -> Self {
        Self {
            estimator,
            trimmer: TextTrimmer::default(),
            options: EngineOptions::default(),
        }
    }

    pub fn with_trimmer(mut self, trimmer: TextTrimmer) -> Self {
        self.trimmer = trimmer;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn trimmer(&self) -> &TextTrimmer {
        &self.trimmer
    }

    /// Apply a request. See [`BudgetEngine::apply_budget`].
    pub fn apply(&self, request: BudgetRequest) -> Result<BudgetReport, BudgetError> {
        self.apply_budget(request.sections, request.max_tokens)
    }

    /// Reduce `sections` until their estimated total is at or under
    /// `max_tokens`.
    ///
    /// # Algorithm
    ///
    /// 1. Estimate every section; return unchanged if the total fits
    /// 2. Guardrail: scale must-keep floors down if they claim too much
    /// 3. Normal pass in trim order: drop droppables, shrink must-keeps to floor
    /// 4. Fallback pass if still over: shrink must-keeps to the hard minimum
    ///
    /// A budget of zero or below always enters the fallback pass, even when
    /// dropping every droppable section already reaches it. An unreachable budget is not an error: the report
    /// carries `total_tokens_after > max_tokens` and the
    /// `budget_unsatisfiable` warning.
    pub fn apply_budget(
        &self,
        sections: Vec<Section>,
        max_tokens: i64,
    ) -> Result<BudgetReport, BudgetError> {
        if let Some(index) = sections.iter().position(|s| s.key.is_empty()) {
            return Err(BudgetError::EmptyKey { index });
        }

        let tokens: Vec<usize> = sections
            .iter()
            .map(|s| self.estimator.estimate(&s.text))
            .collect();
        let total_before: usize = tokens.iter().sum();

        if (total_before as i128) <= max_tokens as i128 {
            debug!(
                total_tokens = total_before,
                max_tokens, "Prompt within budget, no trimming"
            );
            return Ok(BudgetReport::unchanged(sections, total_before, max_tokens));
        }

        let mut warnings = Vec::new();
        let scale = self.guardrail_scale(&sections, max_tokens, &mut warnings);
        let hard_floor = self.hard_floor();
        let order = trim_order(&sections);

        let entries = sections
            .into_iter()
            .zip(tokens)
            .map(|(section, tokens)| {
                let floor = if section.is_must_keep() {
                    scale_floor(section.constraint.min_chars(), scale).max(hard_floor)
                } else {
                    0
                };
                Entry {
                    section,
                    tokens,
                    dropped: false,
                    floor,
                    record: None,
                }
            })
            .collect();

        let mut run = Run {
            entries,
            trims: Vec::new(),
            total: total_before,
            max_tokens,
        };

        let mut mode = BudgetMode::NormalTrim;
        self.reduce(&mut run, &order, TrimPass::Normal);

        if run.over_budget() || max_tokens <= 0 {
            mode = BudgetMode::FallbackTrim;
            if max_tokens <= 0 {
                warn!(max_tokens, "Non-positive budget, trimming as far as possible");
            } else {
                warn!(
                    total_tokens = run.total,
                    max_tokens, "Normal trimming exhausted, ignoring min_chars floors"
                );
            }
            warnings.push(FALLBACK_TRIM_APPLIED.to_string());
            self.reduce(&mut run, &order, TrimPass::Fallback);

            if run.over_budget() {
                warn!(
                    total_tokens = run.total,
                    max_tokens, "Budget unsatisfiable, returning best-effort prompt"
                );
                warnings.push(BUDGET_UNSATISFIABLE.to_string());
            }
        }

        debug!(
            mode = %mode,
            total_before,
            total_after = run.total,
            trims = run.trims.len(),
            "Budget applied"
        );

        Ok(BudgetReport {
            sections: run
                .entries
                .into_iter()
                .filter(|e| !e.dropped)
                .map(|e| e.section)
                .collect(),
            trims: run.trims,
            warnings,
            total_tokens_before: total_before,
            total_tokens_after: run.total,
            max_tokens,
            mode,
        })
    }

    // ── Passes ────────────────────────────────────────────────────────────

    fn reduce(&self, run: &mut Run, order: &[usize], pass: TrimPass) {
        for &idx in order {
            if !run.over_budget() {
                break;
            }

            let entry = &run.entries[idx];
            if entry.dropped || entry.tokens == 0 {
                continue;
            }

            if entry.section.is_must_keep() {
                let floor = match pass {
                    TrimPass::Normal => entry.floor,
                    TrimPass::Fallback => self.hard_floor(),
                };
                self.shrink(run, idx, floor);
            } else {
                run.drop_entry(idx);
            }
        }
    }

    /// Shrink one section only as far as needed to cover the current
    /// excess, stopping at `floor`.
    fn shrink(&self, run: &mut Run, idx: usize, floor: usize) {
        let excess = run.excess();
        let entry = &run.entries[idx];
        let text = entry.section.text.as_str();
        let tokens = entry.tokens;

        let Some(mut best) = self.trimmer.trim(text, floor, floor) else {
            return;
        };
        let mut best_tokens = self.estimator.estimate(&best);
        let goal = tokens.saturating_sub(excess);

        // The floor cut leaves room: find the longest target that still fits.
        if best_tokens <= goal {
            let mut lo = floor;
            let mut hi = entry.section.char_len().saturating_sub(1);
            while lo < hi {
                let mid = lo + (hi - lo).div_ceil(2);
                match self.trimmer.trim(text, mid, floor) {
                    Some(candidate) => {
                        let candidate_tokens = self.estimator.estimate(&candidate);
                        if candidate_tokens <= goal {
                            best = candidate;
                            best_tokens = candidate_tokens;
                            lo = mid;
                        } else {
                            hi = mid - 1;
                        }
                    }
                    None => hi = mid - 1,
                }
            }
        }

        if best_tokens >= tokens {
            return;
        }
        run.replace_text(idx, best, best_tokens);
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    /// Fallback floor: a few content characters plus the marker.
    fn hard_floor(&self) -> usize {
        self.options.fallback_min_chars + self.trimmer.marker_len()
    }

    /// Factor applied to every must-keep floor for this run.
    fn guardrail_scale(
        &self,
        sections: &[Section],
        max_tokens: i64,
        warnings: &mut Vec<String>,
    ) -> f64 {
        let floor_chars: usize = sections
            .iter()
            .filter(|s| s.is_must_keep())
            .map(|s| s.constraint.min_chars())
            .sum();
        if floor_chars == 0 {
            return 1.0;
        }

        let floor_tokens = self.estimator.tokens_for_chars(floor_chars) as f64;
        let allowance = max_tokens.max(0) as f64 * self.options.guardrail_ratio;
        if floor_tokens <= allowance {
            return 1.0;
        }

        let scale = (allowance / floor_tokens).max(self.options.guardrail_min_scale);
        warn!(
            floor_tokens,
            allowance, scale, "must-keep min_chars floors exceed budget guardrail"
        );
        warnings.push(MIN_CHARS_GUARDRAIL.to_string());
        scale
    }
}

/// Section indices in trim order: category precedence, then priority
/// (absent first), then input position.
fn trim_order(sections: &[Section]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..sections.len()).collect();
    order.sort_by_key(|&i| {
        let s = &sections[i];
        (s.category().precedence_rank(), s.constraint.priority())
    });
    order
}

fn scale_floor(min_chars: usize, scale: f64) -> usize {
    (min_chars as f64 * scale).floor() as usize
}

/// Apply a budget with the default engine.
pub fn apply_budget(sections: Vec<Section>, max_tokens: i64) -> Result<BudgetReport, BudgetError> {
    BudgetEngine::new().apply_budget(sections, max_tokens)
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trim::{TRIM_MARKER, fence_count};
    use storyloom_core::{Category, Constraint};

    // ── Helpers ────────────────────────────────────────────────────────

    fn section(key: &str, chars: usize) -> Section {
        Section::new(key, key, "x".repeat(chars))
    }

    fn must_keep(key: &str, chars: usize, min_chars: Option<usize>, priority: Option<i64>) -> Section {
        section(key, chars).with_constraint(Constraint::must_keep(min_chars, priority))
    }

    fn droppable(key: &str, chars: usize, priority: i64) -> Section {
        section(key, chars).with_constraint(Constraint::droppable(priority))
    }

    fn keys(report: &BudgetReport) -> Vec<&str> {
        report.sections.iter().map(|s| s.key.as_str()).collect()
    }

    fn trim_keys(report: &BudgetReport) -> Vec<&str> {
        report.trims.iter().map(|t| t.key.as_str()).collect()
    }

    fn find<'a>(report: &'a BudgetReport, key: &str) -> &'a Section {
        report.sections.iter().find(|s| s.key == key).unwrap()
    }

    fn example_sections() -> Vec<Section> {
        vec![
            must_keep("ruleset.principles", 1000, Some(120), Some(90)),
            section("world.tone", 1000),
        ]
    }

    // ── Unchanged ──────────────────────────────────────────────────────

    #[test]
    fn no_op_below_budget() {
        let sections = vec![section("world.tone", 400), section("npcs.bio", 200)];
        let report = apply_budget(sections.clone(), 150).unwrap();

        assert_eq!(report.sections, sections);
        assert!(report.trims.is_empty());
        assert!(report.warnings.is_empty());
        assert_eq!(report.total_tokens_before, 150);
        assert_eq!(report.total_tokens_after, 150);
        assert_eq!(report.mode, BudgetMode::Unchanged);
    }

    #[test]
    fn empty_input_is_unchanged() {
        let report = apply_budget(Vec::new(), 10).unwrap();
        assert!(report.sections.is_empty());
        assert_eq!(report.mode, BudgetMode::Unchanged);
    }

    // ── Normal trim ────────────────────────────────────────────────────

    #[test]
    fn world_drop_alone_suffices() {
        let report = apply_budget(example_sections(), 260).unwrap();

        assert_eq!(keys(&report), vec!["ruleset.principles"]);
        assert_eq!(find(&report, "ruleset.principles").char_len(), 1000);
        assert!(!find(&report, "ruleset.principles").text.contains(TRIM_MARKER));
        assert_eq!(trim_keys(&report), vec!["world.tone"]);
        assert!(report.warnings.is_empty());
        assert_eq!(report.total_tokens_after, 250);
        assert_eq!(report.mode, BudgetMode::NormalTrim);
    }

    #[test]
    fn must_keep_shrinks_only_as_needed_after_drop() {
        let report = apply_budget(example_sections(), 200).unwrap();

        assert_eq!(
            report.trims,
            vec![
                TrimRecord {
                    key: "world.tone".into(),
                    category: Category::World,
                    action: TrimAction::Dropped,
                    removed_tokens: 250,
                    resulting_length: 0,
                },
                TrimRecord {
                    key: "ruleset.principles".into(),
                    category: Category::Ruleset,
                    action: TrimAction::Shrunk,
                    removed_tokens: 50,
                    resulting_length: 800,
                },
            ]
        );
        let rules = find(&report, "ruleset.principles");
        assert!(rules.text.ends_with(TRIM_MARKER));
        assert!(rules.char_len() >= 120);
        assert!(report.warnings.is_empty());
        assert_eq!(report.total_tokens_before, 500);
        assert_eq!(report.total_tokens_after, 200);
        assert!(report.within_budget());
    }

    #[test]
    fn lowest_priority_dropped_first_within_category() {
        let sections = vec![
            droppable("npcs.hero", 400, 90),
            droppable("npcs.rival", 400, 10),
            droppable("npcs.merchant", 400, 50),
        ];
        let report = apply_budget(sections, 250).unwrap();

        assert_eq!(trim_keys(&report), vec!["npcs.rival"]);
        assert_eq!(keys(&report), vec!["npcs.hero", "npcs.merchant"]);
        assert_eq!(report.total_tokens_after, 200);
    }

    #[test]
    fn absent_priority_trimmed_before_negative_priority() {
        let unranked = section("npcs.a", 400).with_constraint(Constraint::Constrained {
            must_keep: false,
            min_chars: None,
            priority: None,
        });
        let sections = vec![droppable("npcs.b", 400, -5), unranked];
        let report = apply_budget(sections, 150).unwrap();

        assert_eq!(trim_keys(&report), vec!["npcs.a"]);
        assert_eq!(keys(&report), vec!["npcs.b"]);
        assert_eq!(report.total_tokens_after, 100);
    }

    #[test]
    fn priority_ties_follow_input_order() {
        let sections = vec![
            section("state.a", 400),
            section("state.b", 400),
            droppable("state.c", 400, 0),
        ];
        let report = apply_budget(sections, 150).unwrap();
        assert_eq!(trim_keys(&report), vec!["state.a", "state.b"]);
        assert_eq!(keys(&report), vec!["state.c"]);
    }

    #[test]
    fn categories_trimmed_in_precedence_order() {
        let mut sections: Vec<Section> = Category::ALL
            .iter()
            .map(|c| section(&format!("{c}.entry"), 400))
            .collect();
        sections.reverse();

        let report = apply_budget(sections, 350).unwrap();
        assert_eq!(
            trim_keys(&report),
            vec![
                "input.entry",
                "state.entry",
                "npcs.entry",
                "scenario.entry",
                "world.entry"
            ]
        );
        assert_eq!(keys(&report), vec!["core.entry", "ruleset.entry", "module.entry"]);
    }

    #[test]
    fn core_is_touched_last() {
        let sections: Vec<Section> = Category::ALL
            .iter()
            .map(|c| section(&format!("{c}.entry"), 400))
            .collect();
        let report = apply_budget(sections, 50).unwrap();

        assert_eq!(report.trims.len(), 8);
        assert_eq!(report.trims.last().unwrap().category, Category::Core);
        assert!(report.sections.is_empty());
        assert_eq!(report.total_tokens_after, 0);
    }

    #[test]
    fn unknown_prefix_trimmed_with_input() {
        let sections = vec![section("world.lore", 400), section("weather.today", 400)];
        let report = apply_budget(sections, 100).unwrap();
        assert_eq!(trim_keys(&report), vec!["weather.today"]);
        assert_eq!(report.trims[0].category, Category::Input);
    }

    #[test]
    fn must_keep_floor_respected_outside_fallback() {
        let sections = vec![
            must_keep("ruleset.a", 2000, Some(120), None),
            must_keep("core.b", 2000, Some(120), None),
        ];
        let report = apply_budget(sections, 80).unwrap();

        assert!(!report.has_warning(FALLBACK_TRIM_APPLIED));
        assert!(report.warnings.is_empty());
        assert_eq!(find(&report, "ruleset.a").char_len(), 120);
        assert_eq!(find(&report, "core.b").char_len(), 200);
        assert_eq!(report.total_tokens_after, 80);
        for s in &report.sections {
            assert!(s.char_len() >= 120);
        }
    }

    #[test]
    fn empty_sections_are_not_candidates() {
        let sections = vec![section("input.empty", 0), section("world.tone", 400)];
        let report = apply_budget(sections, 50).unwrap();
        assert_eq!(keys(&report), vec!["input.empty"]);
        assert_eq!(trim_keys(&report), vec!["world.tone"]);
    }

    #[test]
    fn duplicate_keys_are_handled() {
        let sections = vec![section("npcs.bio", 400), section("npcs.bio", 400)];
        let report = apply_budget(sections, 100).unwrap();
        assert_eq!(report.trims.len(), 1);
        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.total_tokens_after, 100);
    }

    // ── Guardrail ──────────────────────────────────────────────────────

    #[test]
    fn guardrail_warns_and_relaxes_floors_for_the_run() {
        let sections = vec![
            must_keep("ruleset.a", 1000, Some(400), None),
            must_keep("core.b", 1000, Some(400), None),
        ];
        let report = apply_budget(sections, 250).unwrap();

        assert_eq!(report.warnings, vec![MIN_CHARS_GUARDRAIL.to_string()]);
        assert!(report.warnings[0].contains("min_chars"));
        // 400 * (187.5 / 200)
        assert_eq!(find(&report, "ruleset.a").char_len(), 375);
        assert_eq!(find(&report, "core.b").char_len(), 624);
        assert_eq!(report.total_tokens_after, 250);
        // caller's constraints are untouched
        assert_eq!(find(&report, "ruleset.a").constraint.min_chars(), 400);
    }

    #[test]
    fn guardrail_quiet_when_floors_fit() {
        let report = apply_budget(example_sections(), 200).unwrap();
        assert!(!report.has_warning(MIN_CHARS_GUARDRAIL));
    }

    // ── Fallback ───────────────────────────────────────────────────────

    #[test]
    fn fallback_flagged_when_floor_exceeds_budget() {
        let sections = vec![must_keep("core.rules", 4000, Some(2000), Some(100))];
        let report = apply_budget(sections, 50).unwrap();

        assert_eq!(
            report.warnings,
            vec![
                MIN_CHARS_GUARDRAIL.to_string(),
                FALLBACK_TRIM_APPLIED.to_string()
            ]
        );
        assert_eq!(report.mode, BudgetMode::FallbackTrim);
        assert_eq!(report.total_tokens_after, 50);
        assert!(report.within_budget());

        // normal and fallback shrinks fold into one record
        assert_eq!(report.trims.len(), 1);
        assert_eq!(report.trims[0].removed_tokens, 950);
        assert_eq!(report.trims[0].resulting_length, 200);
        let rules = find(&report, "core.rules");
        assert!(rules.text.ends_with(TRIM_MARKER));
        assert_eq!(rules.text.matches(TRIM_MARKER).count(), 1);
    }

    #[test]
    fn fallback_warning_appears_once() {
        let sections = vec![
            must_keep("ruleset.a", 4000, Some(2000), None),
            must_keep("core.b", 4000, Some(2000), None),
        ];
        let report = apply_budget(sections, 40).unwrap();
        let count = report
            .warnings
            .iter()
            .filter(|w| *w == FALLBACK_TRIM_APPLIED)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn unsatisfiable_budget_returns_best_effort() {
        let sections = vec![must_keep("core.rules", 400, None, None)];
        let report = apply_budget(sections, 2).unwrap();

        assert!(report.has_warning(FALLBACK_TRIM_APPLIED));
        assert!(report.has_warning(BUDGET_UNSATISFIABLE));
        assert!(report.total_tokens_after > 2);
        assert!(!report.within_budget());

        let rules = find(&report, "core.rules");
        // 16 content chars + marker
        assert_eq!(rules.char_len(), 30);
        assert!(rules.text.starts_with("xxxxxxxxxxxxxxxx"));
        assert!(rules.text.ends_with(TRIM_MARKER));
    }

    #[test]
    fn min_chars_larger_than_text_is_graceful() {
        let sections = vec![
            must_keep("core.rules", 400, Some(5000), None),
            section("world.tone", 400),
        ];
        let report = apply_budget(sections, 50).unwrap();

        assert!(report.has_warning(MIN_CHARS_GUARDRAIL));
        assert!(report.has_warning(FALLBACK_TRIM_APPLIED));
        assert_eq!(report.total_tokens_after, 50);
        assert_eq!(keys(&report), vec!["core.rules"]);
    }

    #[test]
    fn zero_budget_is_maximally_aggressive() {
        let sections = vec![
            section("input.player", 100),
            must_keep("core.rules", 400, None, None),
        ];
        let report = apply_budget(sections, 0).unwrap();

        assert_eq!(keys(&report), vec!["core.rules"]);
        assert_eq!(report.mode, BudgetMode::FallbackTrim);
        assert!(report.has_warning(BUDGET_UNSATISFIABLE));
        assert!(!find(&report, "core.rules").text.is_empty());
    }

    #[test]
    fn negative_budget_drops_everything_droppable() {
        let sections = vec![section("input.player", 100), section("world.tone", 100)];
        let report = apply_budget(sections, -10).unwrap();

        assert!(report.sections.is_empty());
        assert_eq!(report.total_tokens_after, 0);
        assert_eq!(report.mode, BudgetMode::FallbackTrim);
        assert!(report.has_warning(BUDGET_UNSATISFIABLE));
    }

    #[test]
    fn zero_budget_with_only_droppables_goes_through_fallback() {
        let sections = vec![section("input.player", 100), section("world.tone", 100)];
        let report = apply_budget(sections, 0).unwrap();
        assert!(report.sections.is_empty());
        assert_eq!(report.mode, BudgetMode::FallbackTrim);
        assert_eq!(report.warnings, vec![FALLBACK_TRIM_APPLIED.to_string()]);
        assert!(report.within_budget());
    }

    // ── Text safety ────────────────────────────────────────────────────

    #[test]
    fn trimming_never_leaves_odd_fences() {
        let mut text = String::new();
        for i in 0..10 {
            text.push_str(&format!(
                "Rule {i}: the narrator describes consequences plainly.\n```\nroll d20 + {i}\n```\n"
            ));
        }
        let rules = Section::new("core.rules", "Rules", text.clone())
            .with_constraint(Constraint::must_keep(None, None));
        let total = crate::token::estimate_tokens(&text) as i64;

        for max_tokens in [total / 2, total / 3, total / 5, 10] {
            let report = apply_budget(vec![rules.clone()], max_tokens).unwrap();
            let out = &report.sections[0].text;
            assert_eq!(fence_count(out) % 2, 0, "odd fences at budget {max_tokens}");
            assert!(out.ends_with(TRIM_MARKER));
        }
    }

    #[test]
    fn untouched_sections_carry_no_marker() {
        let sections = vec![
            section("world.tone", 400),
            must_keep("core.rules", 400, Some(100), None),
        ];
        let report = apply_budget(sections, 150).unwrap();
        assert_eq!(keys(&report), vec!["core.rules"]);
        assert!(!find(&report, "core.rules").text.contains(TRIM_MARKER));
        assert_eq!(trim_keys(&report), vec!["world.tone"]);
    }

    // ── Contract & determinism ─────────────────────────────────────────

    #[test]
    fn empty_key_is_rejected() {
        let sections = vec![section("world.tone", 10), Section::new("", "Orphan", "text")];
        let err = apply_budget(sections, 100).unwrap_err();
        assert_eq!(err, BudgetError::EmptyKey { index: 1 });
    }

    #[test]
    fn repeated_runs_are_identical() {
        let sections = vec![
            must_keep("core.rules", 4000, Some(2000), Some(100)),
            droppable("npcs.rival", 800, 5),
            section("input.player", 300),
            must_keep("ruleset.principles", 1200, Some(120), Some(90)),
        ];
        let engine = BudgetEngine::new();
        let first = engine.apply_budget(sections.clone(), 120).unwrap();
        let second = engine.apply_budget(sections, 120).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    // ── Construction ───────────────────────────────────────────────────

    #[test]
    fn from_config_uses_ratio_and_marker() {
        let config = BudgetConfig {
            chars_per_token: 2,
            trim_marker: "[cut]".into(),
            ..BudgetConfig::default()
        };
        let engine = BudgetEngine::from_config(&config);
        let sections = vec![must_keep("core.rules", 100, None, None)];
        let report = engine.apply_budget(sections, 20).unwrap();

        let rules = find(&report, "core.rules");
        assert!(rules.text.ends_with("\n[cut]"));
        assert_eq!(rules.char_len(), 40);
        assert_eq!(report.total_tokens_before, 50);
        assert_eq!(report.total_tokens_after, 20);
    }

    #[test]
    fn request_accepts_camel_case_fields() {
        let request: BudgetRequest = serde_json::from_str(
            r#"{
                "linearSections": [
                    {"key": "world.tone", "label": "Tone", "text": "a long grim description"},
                    {"key": "core.rules", "label": "Rules", "text": "be fair", "slot": {"mustKeep": true}}
                ],
                "maxTokens": 3
            }"#,
        )
        .unwrap();
        assert_eq!(request.max_tokens, 3);

        let report = BudgetEngine::new().apply(request).unwrap();
        assert_eq!(keys(&report), vec!["core.rules"]);
        assert!(report.within_budget());
    }

    #[test]
    fn boxed_estimator_engine() {
        let estimator: Box<dyn TokenEstimator> = Box::new(CharRatioEstimator::new(1));
        let engine = BudgetEngine::with_estimator(estimator);
        let report = engine
            .apply_budget(vec![section("world.tone", 10)], 5)
            .unwrap();
        assert_eq!(report.total_tokens_before, 10);
        assert!(report.sections.is_empty());
    }
}
