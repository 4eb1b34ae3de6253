//! Fence-safe text trimming.
//!
//! Cuts a section's text down to a target length (in characters) and
//! appends a visible marker on its own line. A cut never lands inside a
//! triple-backtick code fence: when the naive cut point falls inside one,
//! the cut moves to just before the fence, or to just after it when
//! cutting before would go below the caller's floor. An unclosed fence
//! runs to the end of the text.
//!
//! All lengths count the full result, marker included.

/// Default suffix appended to shortened text.
pub const TRIM_MARKER: &str = "… [[trimmed]]";

const FENCE: &str = "```";

/// Byte range covering one fenced block, delimiters included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FenceRegion {
    start: usize,
    end: usize,
}

impl FenceRegion {
    fn contains_cut(&self, cut: usize) -> bool {
        self.start < cut && cut < self.end
    }
}

/// Pair up fence markers into regions. An odd trailing marker opens a
/// region that extends to the end of the text.
fn fence_regions(text: &str) -> Vec<FenceRegion> {
    let markers: Vec<usize> = text.match_indices(FENCE).map(|(i, _)| i).collect();
    markers
        .chunks(2)
        .map(|pair| FenceRegion {
            start: pair[0],
            end: pair.get(1).map(|close| close + FENCE.len()).unwrap_or(text.len()),
        })
        .collect()
}

/// Byte offset of the `n`th character, or the text length.
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices()
        .nth(n)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Number of code-fence markers in `text`.
pub fn fence_count(text: &str) -> usize {
    text.matches(FENCE).count()
}

/// Shortens text while keeping fenced blocks intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTrimmer {
    marker: String,
    /// Marker with its line separator, as appended.
    suffix: String,
    suffix_chars: usize,
}

impl TextTrimmer {
    pub fn new(marker: impl Into<String>) -> Self {
        let marker = marker.into();
        let suffix = format!("\n{marker}");
        let suffix_chars = suffix.chars().count();
        Self {
            marker,
            suffix,
            suffix_chars,
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Characters added by the marker when appended after content.
    pub fn marker_len(&self) -> usize {
        self.suffix_chars
    }

    pub fn is_trimmed(&self, text: &str) -> bool {
        text.ends_with(&self.marker)
    }

    /// Trim `text` to at most `target` characters without going below
    /// `floor`.
    ///
    /// Returns `None` when nothing would be removed: the text already
    /// fits, or the only fence-safe cut is no shorter than the original.
    /// The result may exceed `target` when an intact fence is the only
    /// way to respect `floor`.
    pub fn trim(&self, text: &str, target: usize, floor: usize) -> Option<String> {
        let len = text.chars().count();
        let target = target.max(floor);
        if len <= target {
            return None;
        }

        let content_budget = target.saturating_sub(self.suffix_chars);
        let content_floor = floor.saturating_sub(self.suffix_chars);

        let mut cut = byte_offset(text, content_budget);
        if let Some(region) = fence_regions(text).into_iter().find(|r| r.contains_cut(cut)) {
            let before = text[..region.start].trim_end();
            cut = if before.chars().count() >= content_floor {
                region.start
            } else {
                region.end
            };
        }

        let raw = &text[..cut];
        let tidy = raw.trim_end();
        let kept = if tidy.chars().count() >= content_floor {
            tidy
        } else {
            raw
        };

        let result = if kept.is_empty() {
            self.marker.clone()
        } else {
            format!("{kept}{}", self.suffix)
        };

        if result.chars().count() >= len {
            return None;
        }
        Some(result)
    }
}

impl Default for TextTrimmer {
    fn default() -> Self {
        Self::new(TRIM_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fenced_text() -> String {
        let mut text = "x".repeat(40);
        text.push('\n');
        text.push_str("```rust\n");
        for _ in 0..5 {
            text.push_str("let a = 1;\n");
        }
        text.push_str("```\n");
        text.push_str(&"y".repeat(60));
        text
    }

    #[test]
    fn short_text_is_untouched() {
        let t = TextTrimmer::default();
        assert_eq!(t.trim("short", 100, 0), None);
        assert_eq!(t.trim(&"a".repeat(50), 50, 0), None);
    }

    #[test]
    fn plain_cut_respects_target_and_marks() {
        let t = TextTrimmer::default();
        let out = t.trim(&"a".repeat(200), 100, 0).unwrap();
        assert_eq!(out.chars().count(), 100);
        assert!(out.ends_with(TRIM_MARKER));
        assert!(out.starts_with(&"a".repeat(86)));
    }

    #[test]
    fn marker_length_includes_separator() {
        let t = TextTrimmer::default();
        assert_eq!(t.marker_len(), TRIM_MARKER.chars().count() + 1);
        assert_eq!(t.marker_len(), 14);
    }

    #[test]
    fn cut_inside_fence_moves_before_it() {
        let t = TextTrimmer::default();
        let text = fenced_text();
        // content budget 46 lands inside the fence that opens at char 41
        let out = t.trim(&text, 60, 0).unwrap();
        assert_eq!(out, format!("{}\n{}", "x".repeat(40), TRIM_MARKER));
        assert_eq!(fence_count(&out), 0);
    }

    #[test]
    fn floor_forces_cut_after_fence() {
        let t = TextTrimmer::default();
        let text = fenced_text();
        // keeping only the 40 chars before the fence would break a 58-char floor
        let out = t.trim(&text, 60, 58).unwrap();
        assert_eq!(fence_count(&out), 2);
        assert!(out.chars().count() >= 58);
        assert!(out.chars().count() < text.chars().count());
        assert!(out.ends_with(TRIM_MARKER));
        assert!(out.contains("```\n…") || out.contains("```\n\n…"));
    }

    #[test]
    fn cut_after_complete_fence_keeps_it() {
        let t = TextTrimmer::default();
        let text = fenced_text();
        let len = text.chars().count();
        let out = t.trim(&text, len - 20, 0).unwrap();
        assert_eq!(fence_count(&out), 2);
        assert!(out.chars().count() <= len - 20);
    }

    #[test]
    fn unclosed_fence_is_never_split() {
        let t = TextTrimmer::default();
        let text = format!("{}\n```\n{}", "x".repeat(40), "y".repeat(100));
        let out = t.trim(&text, 80, 0).unwrap();
        assert_eq!(fence_count(&out), 0);
        assert!(out.starts_with(&"x".repeat(40)));
    }

    #[test]
    fn fence_count_stays_even_across_targets() {
        let t = TextTrimmer::default();
        let mut text = String::from("Scene setup.\n");
        for i in 0..4 {
            text.push_str(&format!("Step {i} explained in prose.\n```\ncode block {i}\nmore {i}\n```\n"));
        }
        let len = text.chars().count();
        for target in 0..len {
            if let Some(out) = t.trim(&text, target, 0) {
                assert_eq!(fence_count(&out) % 2, 0, "odd fences at target {target}");
                assert!(out.ends_with(TRIM_MARKER));
            }
        }
    }

    #[test]
    fn text_starting_with_fence_falls_back_to_marker() {
        let t = TextTrimmer::default();
        let text = format!("```\n{}\n```\nafter", "c".repeat(80));
        let out = t.trim(&text, 20, 0).unwrap();
        assert_eq!(out, TRIM_MARKER);
    }

    #[test]
    fn atomic_fence_that_cannot_shrink_returns_none() {
        let t = TextTrimmer::default();
        let text = format!("```\n{}\n```", "c".repeat(80));
        // floor above zero rules out the empty cut; the fence spans the whole text
        assert_eq!(t.trim(&text, 30, 30), None);
    }

    #[test]
    fn utf8_cut_lands_on_char_boundary() {
        let t = TextTrimmer::default();
        let text = "é".repeat(100);
        let out = t.trim(&text, 50, 0).unwrap();
        assert_eq!(out.chars().count(), 50);
    }

    #[test]
    fn floor_higher_than_target_wins() {
        let t = TextTrimmer::default();
        let out = t.trim(&"a".repeat(300), 10, 120).unwrap();
        assert_eq!(out.chars().count(), 120);
    }

    #[test]
    fn custom_marker() {
        let t = TextTrimmer::new("[cut]");
        let out = t.trim(&"a".repeat(100), 20, 0).unwrap();
        assert!(out.ends_with("\n[cut]"));
        assert!(t.is_trimmed(&out));
        assert_eq!(out.chars().count(), 20);
    }
}
