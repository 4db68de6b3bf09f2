//! Speech segmentation.
//!
//! Groups the marks produced by the text walker into segments sized for a
//! single synthesis request. Every segment keeps exactly one anchor mark (the
//! first mark that contributed text to it) so playback can report progress
//! back to the reader.
//!
//! All lengths are counted in Unicode scalar values, never bytes.

use serde::{Deserialize, Serialize};

use super::Mark;

/// Default soft target for a segment.
pub const DEFAULT_PREFERRED_MAX_CHARS: usize = 90;
/// Default hard ceiling for a segment.
pub const DEFAULT_ABSOLUTE_MAX_CHARS: usize = 500;
/// Default floor below which short buffers keep absorbing pieces.
pub const DEFAULT_MIN_CHARS_PER_SEGMENT: usize = 40;

const STRONG_PUNCTUATION: &[char] = &['。', '！', '？', '!', '?', '.', '…'];
const WEAK_PUNCTUATION: &[char] = &['，', '、', ',', '：', ':', '；', ';'];
const LATIN_SENTENCE_END: &[char] = &['.', '!', '?'];

// =============================================================================
// Types
// =============================================================================

/// A speech-ready unit of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub language: String,
    /// First mark that contributed text to this segment.
    pub anchor_mark: Mark,
}

/// Segmentation limits.
///
/// Use [`SegmentOptions::clamped`] (applied by [`build_segments`]) to bring
/// inconsistent values back into range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SegmentOptions {
    pub preferred_max_chars: usize,
    pub absolute_max_chars: usize,
    pub min_chars_per_segment: usize,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            preferred_max_chars: DEFAULT_PREFERRED_MAX_CHARS,
            absolute_max_chars: DEFAULT_ABSOLUTE_MAX_CHARS,
            min_chars_per_segment: DEFAULT_MIN_CHARS_PER_SEGMENT,
        }
    }
}

impl SegmentOptions {
    pub fn new(
        preferred_max_chars: usize,
        absolute_max_chars: usize,
        min_chars_per_segment: usize,
    ) -> Self {
        Self {
            preferred_max_chars,
            absolute_max_chars,
            min_chars_per_segment,
        }
        .clamped()
    }

    /// Returns a copy whose limits satisfy `min <= preferred <= absolute`.
    pub fn clamped(self) -> Self {
        let absolute_max_chars = self.absolute_max_chars.max(1);
        let preferred_max_chars = self.preferred_max_chars.clamp(1, absolute_max_chars);
        let min_chars_per_segment = if self.min_chars_per_segment > preferred_max_chars {
            preferred_max_chars / 2
        } else {
            self.min_chars_per_segment
        };

        Self {
            preferred_max_chars,
            absolute_max_chars,
            min_chars_per_segment,
        }
    }
}

// =============================================================================
// Segmentation
// =============================================================================

/// Builds speech segments from marks in document order.
///
/// Marks whose text is empty after whitespace normalization are skipped. The
/// result is deterministic for a given input.
pub fn build_segments(marks: &[Mark], options: &SegmentOptions) -> Vec<Segment> {
    let options = options.clamped();
    let mut builder = SegmentBuilder::new(options);

    for mark in marks {
        let normalized = normalize_whitespace(&mark.text);
        if normalized.is_empty() {
            continue;
        }
        for piece in split_oversized(&normalized, options.absolute_max_chars) {
            builder.push(mark, piece);
        }
    }

    builder.finish()
}

/// Collapses whitespace runs to a single space and trims both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits `text` into pieces no longer than `limit` characters.
///
/// Each cut happens after the last strong punctuation inside the window, else
/// after the last weak punctuation, else exactly at the limit.
pub fn split_oversized(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    let mut start = 0;

    while chars.len() - start > limit {
        let window = &chars[start..start + limit];
        let cut = last_break_after(window, STRONG_PUNCTUATION)
            .or_else(|| last_break_after(window, WEAK_PUNCTUATION))
            .unwrap_or(limit);

        push_trimmed(&mut pieces, &chars[start..start + cut]);
        start += cut;
        while start < chars.len() && chars[start].is_whitespace() {
            start += 1;
        }
    }

    push_trimmed(&mut pieces, &chars[start..]);
    pieces
}

fn last_break_after(window: &[char], set: &[char]) -> Option<usize> {
    window.iter().rposition(|c| set.contains(c)).map(|index| index + 1)
}

fn push_trimmed(pieces: &mut Vec<String>, chars: &[char]) {
    let piece: String = chars.iter().collect();
    let piece = piece.trim();
    if !piece.is_empty() {
        pieces.push(piece.to_string());
    }
}

/// Separator placed between an accumulated buffer and the next piece.
fn joiner(buffer: &str, piece: &str) -> &'static str {
    let (Some(last), Some(first)) = (buffer.chars().last(), piece.chars().next()) else {
        return "";
    };

    if is_latin_word_char(first)
        && (is_latin_word_char(last) || LATIN_SENTENCE_END.contains(&last))
    {
        " "
    } else {
        ""
    }
}

fn is_latin_word_char(c: char) -> bool {
    // Basic Latin through Latin Extended-B.
    c.is_ascii_alphanumeric() || (c.is_alphabetic() && (c as u32) < 0x0250)
}

struct PendingSegment<'a> {
    text: String,
    chars: usize,
    anchor: &'a Mark,
}

impl<'a> PendingSegment<'a> {
    fn start(anchor: &'a Mark, piece: String) -> Self {
        Self {
            chars: piece.chars().count(),
            text: piece,
            anchor,
        }
    }

    fn into_segment(self) -> Segment {
        Segment {
            text: self.text,
            language: self.anchor.language.clone(),
            anchor_mark: self.anchor.clone(),
        }
    }
}

struct SegmentBuilder<'a> {
    options: SegmentOptions,
    current: Option<PendingSegment<'a>>,
    segments: Vec<Segment>,
}

impl<'a> SegmentBuilder<'a> {
    fn new(options: SegmentOptions) -> Self {
        Self {
            options,
            current: None,
            segments: Vec::new(),
        }
    }

    fn push(&mut self, mark: &'a Mark, piece: String) {
        let Some(mut pending) = self.current.take() else {
            self.current = Some(PendingSegment::start(mark, piece));
            return;
        };

        if language_changes(&pending.anchor.language, &mark.language) {
            self.segments.push(pending.into_segment());
            self.current = Some(PendingSegment::start(mark, piece));
            return;
        }

        let separator = joiner(&pending.text, &piece);
        let piece_chars = piece.chars().count();
        let candidate = pending.chars + separator.len() + piece_chars;

        let fits = candidate < self.options.preferred_max_chars
            || (pending.chars < self.options.min_chars_per_segment
                && candidate <= self.options.absolute_max_chars);

        if fits {
            pending.text.push_str(separator);
            pending.text.push_str(&piece);
            pending.chars = candidate;
            self.current = Some(pending);
        } else {
            self.segments.push(pending.into_segment());
            self.current = Some(PendingSegment::start(mark, piece));
        }
    }

    fn finish(mut self) -> Vec<Segment> {
        if let Some(pending) = self.current.take() {
            self.segments.push(pending.into_segment());
        }
        self.segments
    }
}

fn language_changes(current: &str, next: &str) -> bool {
    !current.is_empty() && !next.is_empty() && !current.eq_ignore_ascii_case(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(name: &str, text: &str) -> Mark {
        Mark::new(name, text, "en", 0)
    }

    #[test]
    fn test_options_clamp() {
        let options = SegmentOptions::new(600, 500, 40);
        assert_eq!(options.preferred_max_chars, 500);

        let options = SegmentOptions::new(90, 500, 120);
        assert_eq!(options.min_chars_per_segment, 45);

        let options = SegmentOptions::new(0, 0, 0);
        assert_eq!(options.absolute_max_chars, 1);
        assert_eq!(options.preferred_max_chars, 1);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \n\t b  "), "a b");
        assert_eq!(normalize_whitespace(" \n "), "");
    }

    #[test]
    fn test_split_prefers_strong_punctuation() {
        let pieces = split_oversized("One, two. Three, four", 15);
        assert_eq!(pieces, vec!["One, two.", "Three, four"]);
    }

    #[test]
    fn test_split_falls_back_to_weak_then_hard_cut() {
        let pieces = split_oversized("alpha, beta gamma", 12);
        assert_eq!(pieces, vec!["alpha,", "beta gamma"]);

        let pieces = split_oversized("abcdefghij", 4);
        assert_eq!(pieces, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_joiner_rules() {
        assert_eq!(joiner("Hello", "world"), " ");
        assert_eq!(joiner("Done.", "Next"), " ");
        assert_eq!(joiner("第一句。", "第二句"), "");
        assert_eq!(joiner("Hello,", "world"), "");
    }

    #[test]
    fn test_empty_marks_are_skipped() {
        let marks = vec![mark("0", "   "), mark("1", "Hello there.")];
        let segments = build_segments(&marks, &SegmentOptions::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].anchor_mark.name, "1");
    }

    #[test]
    fn test_short_marks_merge_under_preferred() {
        let marks = vec![mark("0", "Hello."), mark("1", "World.")];
        let segments = build_segments(&marks, &SegmentOptions::default());
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "Hello. World.");
        assert_eq!(segments[0].anchor_mark.name, "0");
    }

    #[test]
    fn test_language_change_forces_flush() {
        let marks = vec![
            Mark::new("0", "Hello.", "en", 0),
            Mark::new("1", "Bonjour.", "fr", 6),
        ];
        let segments = build_segments(&marks, &SegmentOptions::default());
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].language, "fr");
    }
}
