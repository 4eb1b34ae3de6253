//! Token estimation.
//!
//! The engine only needs a consistent estimator: same text, same count,
//! and longer text never counts fewer tokens. The default is a
//! character-based heuristic (~4 characters per token, rounded up), which
//! is accurate within ~10% for BPE tokenizers on English prose.
//!
//! Enable the `tokenizer` feature for [`HfTokenizerEstimator`], backed by a
//! `tokenizer.json` from the `tokenizers` crate.

use storyloom_core::Section;

/// Maps text to an approximate token count.
pub trait TokenEstimator: Send + Sync {
    /// Estimated tokens for `text`.
    fn estimate(&self, text: &str) -> usize;

    /// Tokens that `chars` characters are assumed to cost.
    ///
    /// Used where only a character count is known, e.g. `min_chars` floors.
    fn tokens_for_chars(&self, chars: usize) -> usize;
}

impl<E: TokenEstimator + ?Sized> TokenEstimator for Box<E> {
    fn estimate(&self, text: &str) -> usize {
        (**self).estimate(text)
    }

    fn tokens_for_chars(&self, chars: usize) -> usize {
        (**self).tokens_for_chars(chars)
    }
}

impl<E: TokenEstimator + ?Sized> TokenEstimator for &E {
    fn estimate(&self, text: &str) -> usize {
        (**self).estimate(text)
    }

    fn tokens_for_chars(&self, chars: usize) -> usize {
        (**self).tokens_for_chars(chars)
    }
}

/// Heuristic estimator: 1 token ≈ `chars_per_token` characters. Rounds up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

    /// A ratio of 0 is clamped to 1.
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    pub fn chars_per_token(&self) -> usize {
        self.chars_per_token
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.tokens_for_chars(text.chars().count())
    }

    fn tokens_for_chars(&self, chars: usize) -> usize {
        chars.div_ceil(self.chars_per_token)
    }
}

/// Estimate tokens with the default heuristic.
pub fn estimate_tokens(text: &str) -> usize {
    CharRatioEstimator::default().estimate(text)
}

/// Total estimated tokens across sections.
pub fn estimate_sections<E: TokenEstimator + ?Sized>(estimator: &E, sections: &[Section]) -> usize {
    sections.iter().map(|s| estimator.estimate(&s.text)).sum()
}

#[cfg(feature = "tokenizer")]
pub use hf::{HfTokenizerEstimator, TokenizerLoadError};

#[cfg(feature = "tokenizer")]
mod hf {
    use super::{CharRatioEstimator, TokenEstimator};
    use std::path::Path;
    use tokenizers::Tokenizer;

    #[derive(Debug, thiserror::Error)]
    #[error("Failed to load tokenizer from {path}: {reason}")]
    pub struct TokenizerLoadError {
        pub path: String,
        pub reason: String,
    }

    /// Estimator backed by a real tokenizer.
    ///
    /// Character-only conversions and encode failures use the heuristic.
    pub struct HfTokenizerEstimator {
        tokenizer: Tokenizer,
        fallback: CharRatioEstimator,
    }

    impl HfTokenizerEstimator {
        pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenizerLoadError> {
            let path = path.as_ref();
            let tokenizer = Tokenizer::from_file(path).map_err(|e| TokenizerLoadError {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            Ok(Self {
                tokenizer,
                fallback: CharRatioEstimator::default(),
            })
        }
    }

    impl TokenEstimator for HfTokenizerEstimator {
        fn estimate(&self, text: &str) -> usize {
            if text.is_empty() {
                return 0;
            }
            match self.tokenizer.encode(text, false) {
                Ok(encoding) => encoding.len(),
                Err(e) => {
                    tracing::debug!(error = %e, "tokenizer encode failed, using heuristic");
                    self.fallback.estimate(text)
                }
            }
        }

        fn tokens_for_chars(&self, chars: usize) -> usize {
            self.fallback.tokens_for_chars(chars)
        }
    }
}
