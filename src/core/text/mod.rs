//! Text input for the playback pipeline.
//!
//! The reader hands the pipeline an [`Utterance`]: an ordered list of
//! [`Mark`]s, either built directly by a text walker or parsed from
//! SSML-like markup with [`Utterance::from_ssml`]. The [`segmenter`] turns
//! those marks into request-sized [`Segment`]s.

pub mod segmenter;
pub mod ssml;

use serde::{Deserialize, Serialize};

pub use segmenter::{
    DEFAULT_ABSOLUTE_MAX_CHARS, DEFAULT_MIN_CHARS_PER_SEGMENT, DEFAULT_PREFERRED_MAX_CHARS,
    Segment, SegmentOptions, build_segments, normalize_whitespace,
};
pub use ssml::parse_marked_text;

/// A named position in the document together with the text that follows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mark {
    pub name: String,
    pub text: String,
    pub language: String,
    /// Character offset of the mark within the utterance's plain text.
    pub offset: usize,
}

impl Mark {
    pub fn new(
        name: impl Into<String>,
        text: impl Into<String>,
        language: impl Into<String>,
        offset: usize,
    ) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            language: language.into(),
            offset,
        }
    }
}

/// One unit of text handed to a speech engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub marks: Vec<Mark>,
}

impl Utterance {
    pub fn new(marks: Vec<Mark>) -> Self {
        Self { marks }
    }

    /// Wraps plain text in a single mark named `"0"`.
    pub fn from_plain_text(text: &str, language: &str) -> Self {
        Self::new(vec![Mark::new("0", text, language, 0)])
    }

    /// Parses SSML-like marked text. See [`parse_marked_text`].
    pub fn from_ssml(markup: &str, default_language: &str) -> Self {
        Self::new(parse_marked_text(markup, default_language))
    }

    pub fn is_empty(&self) -> bool {
        self.marks.iter().all(|mark| mark.text.trim().is_empty())
    }

    pub fn mark_names(&self) -> impl Iterator<Item = &str> {
        self.marks.iter().map(|mark| mark.name.as_str())
    }

    /// Returns the suffix of this utterance starting at `mark_name`.
    ///
    /// Unknown names yield the whole utterance.
    pub fn resume_from(&self, mark_name: &str) -> Self {
        match self.marks.iter().position(|mark| mark.name == mark_name) {
            Some(index) => Self::new(self.marks[index..].to_vec()),
            None => self.clone(),
        }
    }

    /// Concatenated text of all marks.
    pub fn plain_text(&self) -> String {
        self.marks.iter().map(|mark| mark.text.as_str()).collect()
    }
}
