//! # Storyloom Core
//!
//! Domain types and error definitions for Storyloom prompt budgeting.
//! This crate has **no framework dependencies**: it defines the section
//! model that the budget engine, configuration and telemetry crates
//! work against.
//!
//! ## Model
//!
//! - [`Section`]: a labeled piece of prompt text with a [`Constraint`]
//! - [`Category`]: one of eight trim groupings derived from a section key
//! - [`BudgetError`]: contract violations rejected before allocation

pub mod category;
pub mod error;
pub mod section;

pub use category::Category;
pub use error::{BudgetError, Error, Result};
pub use section::{Constraint, Section};
