//! Thread-safe trim collector: records budget runs and aggregates removed
//! tokens per category and per session.

use crate::TelemetryError;
use crate::model::*;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};
use storyloom_budget::BudgetReport;
use storyloom_config::TelemetryConfig;

/// Recent events kept for inspection, independent of session retention.
const MAX_EVENTS: usize = 5_000;

/// The trim telemetry collector.
///
/// Thread-safe via `RwLock`. Sessions are retained in first-seen order and
/// the oldest is evicted once `max_sessions` is exceeded; global totals
/// keep counting evicted sessions.
pub struct TrimTelemetry {
    enabled: bool,
    max_sessions: usize,
    /// Most recent last.
    events: RwLock<VecDeque<TrimEvent>>,
    sessions: RwLock<SessionStore>,
    totals: RwLock<TrimTotals>,
}

#[derive(Debug, Default)]
struct SessionStore {
    /// Session ids, oldest first.
    order: VecDeque<String>,
    by_id: HashMap<String, SessionTotals>,
    evicted: u64,
}

impl SessionStore {
    fn upsert(&mut self, event: &TrimEvent, max_sessions: usize) {
        if let Some(session) = self.by_id.get_mut(&event.session_id) {
            session.last_seen = event.recorded_at;
            session.totals.absorb(event);
            return;
        }

        let mut session = SessionTotals::new(event.session_id.clone(), event.recorded_at);
        session.totals.absorb(event);
        self.by_id.insert(event.session_id.clone(), session);
        self.order.push_back(event.session_id.clone());

        while self.order.len() > max_sessions {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.by_id.remove(&oldest);
            self.evicted += 1;
            tracing::debug!(session_id = %oldest, "Evicted trim session aggregate");
        }
    }

    fn remove(&mut self, session_id: &str) -> bool {
        if self.by_id.remove(session_id).is_none() {
            return false;
        }
        self.order.retain(|id| id != session_id);
        true
    }
}

impl TrimTelemetry {
    /// Create an enabled collector retaining `max_sessions` sessions.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            enabled: true,
            max_sessions: max_sessions.max(1),
            events: RwLock::new(VecDeque::new()),
            sessions: RwLock::new(SessionStore::default()),
            totals: RwLock::new(TrimTotals::default()),
        }
    }

    /// Create a collector from the `[telemetry]` configuration table.
    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self {
            enabled: config.enabled,
            ..Self::new(config.max_sessions)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    // ── Recording ─────────────────────────────────────────────────────

    /// Record one budget run for `session_id`.
    ///
    /// Returns the stored event, or `None` when the collector is disabled.
    pub fn record(
        &self,
        session_id: &str,
        report: &BudgetReport,
    ) -> Result<Option<TrimEvent>, TelemetryError> {
        if session_id.trim().is_empty() {
            return Err(TelemetryError::EmptySessionId);
        }
        if !self.enabled {
            return Ok(None);
        }

        let event = TrimEvent::from_report(session_id, report);

        self.totals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .absorb(&event);

        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert(&event, self.max_sessions);

        {
            let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
            if events.len() >= MAX_EVENTS {
                events.pop_front();
            }
            events.push_back(event.clone());
        }

        if event.fallback() {
            tracing::warn!(
                session_id,
                removed_tokens = event.removed_tokens(),
                unsatisfiable = event.unsatisfiable(),
                "Budget run needed fallback trimming"
            );
        } else {
            tracing::debug!(
                session_id,
                removed_tokens = event.removed_tokens(),
                mode = %event.mode,
                "Recorded budget run"
            );
        }

        Ok(Some(event))
    }

    /// Forget one session's aggregate. Global totals are unchanged.
    pub fn clear_session(&self, session_id: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id)
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Aggregate for one session.
    pub fn session(&self, session_id: &str) -> Option<SessionTotals> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.by_id.get(session_id).cloned()
    }

    /// All retained sessions, oldest first.
    pub fn sessions(&self) -> Vec<SessionTotals> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .order
            .iter()
            .filter_map(|id| sessions.by_id.get(id).cloned())
            .collect()
    }

    /// Recent events, most recent first.
    pub fn recent_events(&self, limit: usize) -> Vec<TrimEvent> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        events.iter().rev().take(limit).cloned().collect()
    }

    pub fn event_count(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Point-in-time totals.
    pub fn snapshot(&self) -> TrimSnapshot {
        let totals = self
            .totals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);

        TrimSnapshot {
            taken_at: Utc::now(),
            totals,
            session_count: sessions.by_id.len(),
            evicted_sessions: sessions.evicted,
        }
    }

    /// Snapshot rendered as pretty JSON.
    pub fn snapshot_json(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }
}

impl Default for TrimTelemetry {
    fn default() -> Self {
        Self::from_config(&TelemetryConfig::default())
    }
}
