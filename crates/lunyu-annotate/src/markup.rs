//! Splitting text into literal runs and markup tags.
//!
//! A tag is any `<` followed by at least one non-`>` character up to the next
//! `>`. Tags are never scanned for patterns. [`Scope`] additionally tracks
//! whether a literal run sits inside an element that was itself produced by
//! annotation (`<ruby>`, `<rt>`, `<rp>`, or anything classed `rare-char`), so
//! re-annotating emitted markup leaves it untouched.

use std::sync::LazyLock;

use regex::Regex;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));

const VOID_ELEMENTS: [&str; 6] = ["br", "hr", "img", "wbr", "input", "meta"];
const PROTECTED_ELEMENTS: [&str; 3] = ["ruby", "rt", "rp"];
const PROTECTED_CLASS: &str = "rare-char";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Segment<'a> {
    Text(&'a str),
    Tag(&'a str),
}

/// Alternating literal and tag segments in source order. Empty literal runs
/// are skipped.
pub fn segments(text: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in TAG.find_iter(text) {
        if m.start() > last {
            out.push(Segment::Text(&text[last..m.start()]));
        }
        out.push(Segment::Tag(m.as_str()));
        last = m.end();
    }
    if last < text.len() {
        out.push(Segment::Text(&text[last..]));
    }
    out
}

#[derive(Debug, Eq, PartialEq)]
enum TagKind<'a> {
    Open { name: String, raw: &'a str },
    Close { name: String },
    Other,
}

fn classify(tag: &str) -> TagKind<'_> {
    let inner = tag.trim_start_matches('<').trim_end_matches('>');
    let (closing, body) = match inner.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, inner),
    };
    let name: String = body
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if name.is_empty() {
        return TagKind::Other;
    }
    if closing {
        return TagKind::Close { name };
    }
    if body.trim_end().ends_with('/') || VOID_ELEMENTS.contains(&name.as_str()) {
        return TagKind::Other;
    }
    TagKind::Open { name, raw: tag }
}

fn has_protected_class(tag: &str) -> bool {
    let Some(pos) = tag.find("class=") else {
        return false;
    };
    let rest = &tag[pos + "class=".len()..];
    let value = match rest.chars().next() {
        Some(q @ ('"' | '\'')) => rest[1..].split(q).next().unwrap_or_default(),
        _ => rest
            .split(|c: char| c.is_whitespace() || c == '>')
            .next()
            .unwrap_or_default(),
    };
    value.split_whitespace().any(|class| class == PROTECTED_CLASS)
}

/// Element stack used to decide whether a literal run may be annotated.
#[derive(Debug, Default)]
pub struct Scope {
    stack: Vec<(String, bool)>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a tag segment.
    pub fn enter(&mut self, tag: &str) {
        match classify(tag) {
            TagKind::Open { name, raw } => {
                let protected = self.is_protected()
                    || PROTECTED_ELEMENTS.contains(&name.as_str())
                    || has_protected_class(raw);
                self.stack.push((name, protected));
            }
            TagKind::Close { name } => {
                // Unbalanced closers are ignored rather than unwinding the stack.
                if let Some(pos) = self.stack.iter().rposition(|(open, _)| *open == name) {
                    self.stack.truncate(pos);
                }
            }
            TagKind::Other => {}
        }
    }

    /// True when the current position is inside emitted annotation markup.
    pub fn is_protected(&self) -> bool {
        self.stack.last().is_some_and(|(_, protected)| *protected)
    }
}
