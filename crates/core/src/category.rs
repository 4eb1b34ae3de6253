//! Trim categories and their precedence.
//!
//! Every section key maps to exactly one of eight categories, taken from
//! the key's first dot-segment (`world.tone` → [`Category::World`]).
//! Unknown prefixes fall back to [`Category::Input`], the category that is
//! trimmed first.
//!
//! | Rank | Category | Typical content |
//! |------|----------|-----------------|
//! | 0 | `input` | Player input, unknown keys |
//! | 1 | `state` | Player/game state |
//! | 2 | `npcs` | NPC biographies |
//! | 3 | `scenario` | Scenario data |
//! | 4 | `world` | World lore and tone |
//! | 5 | `module` | Adventure module content |
//! | 6 | `ruleset` | Ruleset principles |
//! | 7 | `core` | Core rules, trimmed last |

use serde::{Deserialize, Serialize};

/// A closed set of section groupings, declared in trim order
/// (least important first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Input,
    State,
    Npcs,
    Scenario,
    World,
    Module,
    Ruleset,
    Core,
}

impl Category {
    /// All categories in precedence order.
    pub const ALL: [Category; 8] = [
        Category::Input,
        Category::State,
        Category::Npcs,
        Category::Scenario,
        Category::World,
        Category::Module,
        Category::Ruleset,
        Category::Core,
    ];

    /// Classify a section key by its prefix up to the first dot.
    ///
    /// Matching is exact and case-sensitive. Anything else, including an
    /// empty prefix, lands in [`Category::Input`].
    pub fn classify(key: &str) -> Self {
        let prefix = key.split('.').next().unwrap_or_default();
        Self::from_prefix(prefix).unwrap_or(Category::Input)
    }

    /// Look up a known category name.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == prefix)
    }

    /// Position in the trim order. Lower ranks are trimmed first.
    pub fn precedence_rank(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::State => "state",
            Self::Npcs => "npcs",
            Self::Scenario => "scenario",
            Self::World => "world",
            Self::Module => "module",
            Self::Ruleset => "ruleset",
            Self::Core => "core",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
