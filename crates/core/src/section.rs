//! Prompt section domain types.
//!
//! A [`Section`] is one independently trimmable piece of prompt text
//! (rules, lore, an NPC biography, the player's input). Its optional
//! constraint bundle is modelled as the [`Constraint`] sum type; on the
//! wire it is the optional `slot` object.

use crate::category::Category;
use serde::{Deserialize, Serialize};

/// Trimming constraints attached to a section.
///
/// Serialized as an optional `slot` object: an absent or `null` slot is
/// [`Constraint::Unconstrained`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<Slot>", into = "Option<Slot>")]
pub enum Constraint {
    /// Freely droppable, priority 0.
    #[default]
    Unconstrained,
    Constrained {
        /// Never dropped by normal trimming, only shrunk to its floor.
        must_keep: bool,
        /// Character floor preserved by normal trimming.
        min_chars: Option<usize>,
        /// Higher is more important. Missing means 0.
        priority: Option<i64>,
    },
}

impl Constraint {
    /// A must-keep constraint.
    pub fn must_keep(min_chars: Option<usize>, priority: Option<i64>) -> Self {
        Self::Constrained {
            must_keep: true,
            min_chars,
            priority,
        }
    }

    /// A droppable section with an explicit priority.
    pub fn droppable(priority: i64) -> Self {
        Self::Constrained {
            must_keep: false,
            min_chars: None,
            priority: Some(priority),
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        matches!(self, Self::Unconstrained)
    }

    pub fn is_must_keep(&self) -> bool {
        match self {
            Self::Unconstrained => false,
            Self::Constrained { must_keep, .. } => *must_keep,
        }
    }

    /// Declared character floor, 0 when absent.
    pub fn min_chars(&self) -> usize {
        match self {
            Self::Unconstrained => 0,
            Self::Constrained { min_chars, .. } => min_chars.unwrap_or(0),
        }
    }

    /// Effective priority used for ordering within a category.
    ///
    /// An unconstrained section counts as `Some(0)`. A slot without a
    /// priority is `None`, which orders below every explicit priority.
    pub fn priority(&self) -> Option<i64> {
        match self {
            Self::Unconstrained => Some(0),
            Self::Constrained { priority, .. } => *priority,
        }
    }
}

/// Wire shape of the constraint bundle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Slot {
    #[serde(default, alias = "mustKeep")]
    must_keep: bool,
    #[serde(default, alias = "minChars", skip_serializing_if = "Option::is_none")]
    min_chars: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<i64>,
}

impl From<Option<Slot>> for Constraint {
    fn from(slot: Option<Slot>) -> Self {
        match slot {
            None => Self::Unconstrained,
            Some(s) => Self::Constrained {
                must_keep: s.must_keep,
                min_chars: s.min_chars,
                priority: s.priority,
            },
        }
    }
}

impl From<Constraint> for Option<Slot> {
    fn from(constraint: Constraint) -> Self {
        match constraint {
            Constraint::Unconstrained => None,
            Constraint::Constrained {
                must_keep,
                min_chars,
                priority,
            } => Some(Slot {
                must_keep,
                min_chars,
                priority,
            }),
        }
    }
}

/// One labeled unit of prompt content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Stable dotted identifier, e.g. `world.tone`.
    pub key: String,

    /// Human-readable name (cosmetic).
    #[serde(default)]
    pub label: String,

    /// Current content.
    #[serde(default)]
    pub text: String,

    #[serde(default, rename = "slot", skip_serializing_if = "Constraint::is_unconstrained")]
    pub constraint: Constraint,
}

impl Section {
    /// Create an unconstrained section.
    pub fn new(key: impl Into<String>, label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            text: text.into(),
            constraint: Constraint::Unconstrained,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = constraint;
        self
    }

    /// Category derived from the key prefix.
    pub fn category(&self) -> Category {
        Category::classify(&self.key)
    }

    /// Length of the text in characters (Unicode scalar values).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_must_keep(&self) -> bool {
        self.constraint.is_must_keep()
    }
}
