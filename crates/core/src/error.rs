//! Error types for the Storyloom domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for Storyloom operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Budget allocation errors ---
    #[error("Budget error: {0}")]
    Budget(#[from] BudgetError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Contract violations in a budget request.
///
/// Infeasible budgets are not errors; they surface as report warnings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BudgetError {
    #[error("Section at index {index} has an empty key")]
    EmptyKey { index: usize },
}
