//! Data model for recorded trim runs and their aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use storyloom_budget::{BUDGET_UNSATISFIABLE, BudgetMode, BudgetReport};
use storyloom_core::Category;
use uuid::Uuid;

// ── Event ─────────────────────────────────────────────────────────────────

/// One budget run, reduced to what dashboards need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimEvent {
    /// Unique identifier.
    pub id: String,
    /// Session the run belongs to.
    pub session_id: String,
    /// When the run was recorded.
    pub recorded_at: DateTime<Utc>,
    pub mode: BudgetMode,
    pub max_tokens: i64,
    pub total_tokens_before: usize,
    pub total_tokens_after: usize,
    /// Number of sections dropped or shrunk.
    pub trimmed_sections: usize,
    /// Removed tokens per category.
    pub by_scope: BTreeMap<Category, usize>,
    pub warnings: Vec<String>,
}

impl TrimEvent {
    /// Summarise a report for `session_id`.
    pub fn from_report(session_id: impl Into<String>, report: &BudgetReport) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            recorded_at: Utc::now(),
            mode: report.mode,
            max_tokens: report.max_tokens,
            total_tokens_before: report.total_tokens_before,
            total_tokens_after: report.total_tokens_after,
            trimmed_sections: report.trims.len(),
            by_scope: report.removed_by_category(),
            warnings: report.warnings.clone(),
        }
    }

    /// Tokens removed across all categories.
    pub fn removed_tokens(&self) -> usize {
        self.by_scope.values().sum()
    }

    pub fn fallback(&self) -> bool {
        self.mode == BudgetMode::FallbackTrim
    }

    pub fn unsatisfiable(&self) -> bool {
        self.warnings.iter().any(|w| w == BUDGET_UNSATISFIABLE)
    }
}

// ── Aggregates ────────────────────────────────────────────────────────────

/// Running totals shared by the global and per-session views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimTotals {
    /// Budget runs recorded.
    pub runs: u64,
    /// Runs that changed at least one section.
    pub trimmed_runs: u64,
    pub fallback_runs: u64,
    pub unsatisfiable_runs: u64,
    pub removed_tokens: u64,
    /// Removed tokens per category.
    pub by_scope: BTreeMap<Category, u64>,
}

impl TrimTotals {
    pub(crate) fn absorb(&mut self, event: &TrimEvent) {
        self.runs += 1;
        if event.mode != BudgetMode::Unchanged {
            self.trimmed_runs += 1;
        }
        if event.fallback() {
            self.fallback_runs += 1;
        }
        if event.unsatisfiable() {
            self.unsatisfiable_runs += 1;
        }
        for (category, removed) in &event.by_scope {
            let removed = *removed as u64;
            *self.by_scope.entry(*category).or_insert(0) += removed;
            self.removed_tokens += removed;
        }
    }

    /// Removed tokens for one category, 0 if never trimmed.
    pub fn removed_for(&self, category: Category) -> u64 {
        self.by_scope.get(&category).copied().unwrap_or(0)
    }
}

/// Aggregate for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub session_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(flatten)]
    pub totals: TrimTotals,
}

impl SessionTotals {
    pub(crate) fn new(session_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            first_seen: at,
            last_seen: at,
            totals: TrimTotals::default(),
        }
    }
}

/// Point-in-time view of everything recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimSnapshot {
    pub taken_at: DateTime<Utc>,
    #[serde(flatten)]
    pub totals: TrimTotals,
    /// Sessions currently retained.
    pub session_count: usize,
    /// Sessions evicted to honour the retention limit.
    pub evicted_sessions: u64,
}
