//! Trim telemetry for Storyloom.
//!
//! Consumes [`storyloom_budget::BudgetReport`]s and aggregates removed
//! tokens per category ("by scope") and per session, for dashboards that
//! track how much prompt content each model budget costs.

pub mod engine;
pub mod model;

pub use engine::TrimTelemetry;
pub use model::{SessionTotals, TrimEvent, TrimSnapshot, TrimTotals};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("session id must not be empty")]
    EmptySessionId,

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
