//! Marked-text parsing.
//!
//! The reader emits SSML-like markup where every speakable range is preceded
//! by a `<mark name="…"/>` tag:
//!
//! ```text
//! <speak xml:lang="en"><mark name="0"/>First sentence. <mark name="1"/>Second.</speak>
//! ```
//!
//! Only the parts the pipeline needs are understood: `mark` tags, `xml:lang`
//! attributes on any element (scoped to that element) and XML character
//! entities. Every other tag is dropped and its text kept.

use std::sync::LazyLock;

use regex::Regex;

use super::Mark;

static TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(/?)([A-Za-z][\w:.-]*)((?:\s+[^\s=/>]+\s*=\s*(?:"[^"]*"|'[^']*'))*)\s*(/?)>"#)
        .expect("tag pattern is valid")
});

static ATTRIBUTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s=/>]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("attribute pattern is valid")
});

static COMMENT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|<\?.*?\?>").expect("comment pattern is valid"));

/// Parses marked text into marks in document order.
///
/// Text that precedes the first `mark` tag is kept under a mark with an empty
/// name, so nothing speakable is lost. Offsets count characters of decoded
/// text.
pub fn parse_marked_text(markup: &str, default_language: &str) -> Vec<Mark> {
    let markup = COMMENT_PATTERN.replace_all(markup, "");
    let mut parser = MarkCollector::new(default_language);
    let mut cursor = 0;

    for tag in TAG_PATTERN.captures_iter(&markup) {
        let Some(whole) = tag.get(0) else { continue };
        parser.push_text(&markup[cursor..whole.start()]);
        cursor = whole.end();

        let closing = !tag[1].is_empty();
        let self_closing = !tag[4].is_empty();
        let name = tag[2].to_ascii_lowercase();
        let attributes = tag.get(3).map_or("", |m| m.as_str());

        if closing {
            parser.close_element(&name);
            continue;
        }

        if name == "mark" {
            if let Some(mark_name) = attribute(attributes, "name") {
                parser.start_mark(&mark_name);
            }
            continue;
        }

        if !self_closing {
            parser.open_element(&name, attribute(attributes, "xml:lang"));
        }
    }
    parser.push_text(&markup[cursor..]);

    parser.finish()
}

fn attribute(attributes: &str, wanted: &str) -> Option<String> {
    ATTRIBUTE_PATTERN.captures_iter(attributes).find_map(|captures| {
        if !captures[1].eq_ignore_ascii_case(wanted) {
            return None;
        }
        captures
            .get(2)
            .or_else(|| captures.get(3))
            .map(|value| decode_entities(value.as_str()))
    })
}

/// Decodes the predefined XML entities and numeric character references.
///
/// Unknown entities are left untouched.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut decoded = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        decoded.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let Some(end) = candidate.find(';').filter(|end| *end <= 10) else {
            decoded.push('&');
            rest = &candidate[1..];
            continue;
        };

        match decode_entity(&candidate[1..end]) {
            Some(c) => {
                decoded.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                decoded.push('&');
                rest = &candidate[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

struct OpenElement {
    name: String,
    language: Option<String>,
}

struct MarkCollector {
    default_language: String,
    elements: Vec<OpenElement>,
    marks: Vec<Mark>,
    offset: usize,
}

impl MarkCollector {
    fn new(default_language: &str) -> Self {
        Self {
            default_language: default_language.to_string(),
            elements: Vec::new(),
            marks: Vec::new(),
            offset: 0,
        }
    }

    fn language(&self) -> String {
        self.elements
            .iter()
            .rev()
            .find_map(|element| element.language.clone())
            .unwrap_or_else(|| self.default_language.clone())
    }

    fn open_element(&mut self, name: &str, language: Option<String>) {
        self.elements.push(OpenElement {
            name: name.to_string(),
            language: language.filter(|lang| !lang.trim().is_empty()),
        });
    }

    fn close_element(&mut self, name: &str) {
        if let Some(index) = self.elements.iter().rposition(|element| element.name == name) {
            self.elements.truncate(index);
        }
    }

    fn start_mark(&mut self, name: &str) {
        let language = self.language();
        self.marks.push(Mark::new(name, String::new(), language, self.offset));
    }

    fn push_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let text = decode_entities(raw);

        if self.marks.is_empty() {
            if text.trim().is_empty() {
                return;
            }
            let language = self.language();
            self.marks.push(Mark::new("", String::new(), language, self.offset));
        }

        self.offset += text.chars().count();
        if let Some(mark) = self.marks.last_mut() {
            mark.text.push_str(&text);
        }
    }

    fn finish(self) -> Vec<Mark> {
        self.marks
    }
}
