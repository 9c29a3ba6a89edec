use std::sync::LazyLock;

use lunyu_types::{GlossInfo, PhraseUnit, Phrases, RareWords};
use regex::Regex;

use crate::markup::{Scope, Segment, segments};
use crate::pattern::{CompileError, PatternSet};

static STRIKEOUT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)~~(.*?)~~").expect("strikeout regex"));

/// Rewrites `~~text~~` as `<s>text</s>`. Non-greedy, spans newlines.
pub fn normalize_strikeout(text: &str) -> String {
    STRIKEOUT.replace_all(text, "<s>$1</s>").into_owned()
}

/// Escape a value for embedding as lookup metadata: backslashes first, then
/// single quotes.
pub fn escape_metadata(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Dictionary values are plain text; escape them for both attributes and
/// element content.
fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
    out
}

fn metadata_attr(value: &str) -> String {
    escape_html(&escape_metadata(value))
}

/// Rare-word and phrase dictionaries compiled into a single-pass annotator.
#[derive(Clone, Debug)]
pub struct Annotator {
    rare_words: RareWords,
    phrases: Phrases,
    patterns: PatternSet,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::empty()
    }
}

impl Annotator {
    pub fn new(rare_words: RareWords, phrases: Phrases) -> Result<Self, CompileError> {
        let patterns = PatternSet::compile(&rare_words, &phrases)?;
        Ok(Self {
            rare_words,
            phrases,
            patterns,
        })
    }

    /// Annotator with no dictionary; only strikeouts are rewritten.
    pub fn empty() -> Self {
        Self {
            rare_words: RareWords::new(),
            phrases: Phrases::new(),
            patterns: PatternSet::empty(),
        }
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn rare_words(&self) -> &RareWords {
        &self.rare_words
    }

    pub fn phrases(&self) -> &Phrases {
        &self.phrases
    }

    /// Produce ruby/definition markup for `text`.
    ///
    /// Existing tags are copied verbatim, and literal text inside markup this
    /// annotator emits (ruby groups, `rare-char` spans) is never rescanned, so
    /// annotating already-annotated text is a no-op for those spans.
    pub fn annotate(&self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        let normalized = normalize_strikeout(text);
        let Some(matcher) = self.patterns.matcher() else {
            return normalized;
        };

        let mut out = String::with_capacity(normalized.len() * 2);
        let mut scope = Scope::new();
        for segment in segments(&normalized) {
            match segment {
                Segment::Tag(tag) => {
                    scope.enter(tag);
                    out.push_str(tag);
                }
                Segment::Text(run) if scope.is_protected() => out.push_str(run),
                Segment::Text(run) => {
                    let mut last = 0;
                    for m in matcher.find_iter(run) {
                        out.push_str(&run[last..m.start()]);
                        self.render_match(m.as_str(), &mut out);
                        last = m.end();
                    }
                    out.push_str(&run[last..]);
                }
            }
        }
        out
    }

    fn render_match(&self, key: &str, out: &mut String) {
        if let Some(units) = self.phrases.get(key) {
            render_phrase(units, out);
        } else if let Some(info) = self.rare_words.get(key) {
            render_rare_word(key, info, out);
        } else {
            out.push_str(key);
        }
    }
}

fn render_phrase(units: &[PhraseUnit], out: &mut String) {
    out.push_str("<ruby>");
    for unit in units {
        out.push_str(&escape_html(&unit.display));
        out.push_str("<rt>");
        out.push_str(&escape_html(&unit.gloss));
        out.push_str("</rt>");
    }
    out.push_str("</ruby>");
}

fn render_rare_word(key: &str, info: &GlossInfo, out: &mut String) {
    let character = metadata_attr(key);
    let definition = metadata_attr(info.definition());
    let text = escape_html(key);
    match info.phonetic() {
        Some(gloss) => {
            out.push_str(&format!(
                r#"<ruby class="rare-char" data-action="gloss" data-char="{character}" data-gloss="{}" data-definition="{definition}">{text}<rt>{}</rt></ruby>"#,
                metadata_attr(gloss),
                escape_html(gloss),
            ));
        }
        None => {
            out.push_str(&format!(
                r#"<span class="rare-char" data-action="gloss" data-char="{character}" data-gloss="" data-definition="{definition}">{text}</span>"#,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gloss(phonetic: &str, definition: &str) -> GlossInfo {
        GlossInfo {
            phonetic: (!phonetic.is_empty()).then(|| phonetic.to_string()),
            definition: (!definition.is_empty()).then(|| definition.to_string()),
        }
    }

    #[test]
    fn strikeout_is_non_greedy_and_multiline() {
        assert_eq!(normalize_strikeout("~~a~~b~~c~~"), "<s>a</s>b<s>c</s>");
        assert_eq!(normalize_strikeout("~~a\nb~~"), "<s>a\nb</s>");
        assert_eq!(normalize_strikeout("~~open"), "~~open");
    }

    #[test]
    fn metadata_escapes_backslash_before_quote() {
        assert_eq!(escape_metadata(r"a\'b"), r"a\\\'b");
        assert_eq!(escape_metadata("it's"), r"it\'s");
    }

    #[test]
    fn empty_text_stays_empty() {
        let annotator = Annotator::empty();
        assert_eq!(annotator.annotate(""), "");
    }

    #[test]
    fn rare_word_with_gloss_becomes_interactive_ruby() {
        let mut rare = RareWords::new();
        rare.insert("說".into(), gloss("ㄩㄝˋ", "通「悅」，高興"));
        let annotator = Annotator::new(rare, Phrases::new()).unwrap();
        let out = annotator.annotate("不亦說乎");
        assert_eq!(
            out,
            r#"不亦<ruby class="rare-char" data-action="gloss" data-char="說" data-gloss="ㄩㄝˋ" data-definition="通「悅」，高興">說<rt>ㄩㄝˋ</rt></ruby>乎"#
        );
    }

    #[test]
    fn rare_word_without_gloss_becomes_span() {
        let mut rare = RareWords::new();
        rare.insert("弟".into(), gloss("", "it's \"elder\" <b>"));
        let annotator = Annotator::new(rare, Phrases::new()).unwrap();
        let out = annotator.annotate("孝弟");
        assert_eq!(
            out,
            r#"孝<span class="rare-char" data-action="gloss" data-char="弟" data-gloss="" data-definition="it\'s &quot;elder&quot; &lt;b&gt;">弟</span>"#
        );
    }

    #[test]
    fn tags_are_not_scanned() {
        let mut rare = RareWords::new();
        rare.insert("s".into(), gloss("x", ""));
        let annotator = Annotator::new(rare, Phrases::new()).unwrap();
        let out = annotator.annotate("~~a~~");
        assert_eq!(out, "<s>a</s>");
    }

    #[test]
    fn dictionary_text_is_escaped_in_element_content() {
        let mut rare = RareWords::new();
        rare.insert("&".into(), gloss("<i>", ""));
        let mut phrases = Phrases::new();
        phrases.insert(
            "A&B".into(),
            vec![PhraseUnit::new("A&", "<x>"), PhraseUnit::new("B", "b")],
        );
        let annotator = Annotator::new(rare, phrases).unwrap();

        let rare_out = annotator.annotate("x&y");
        assert!(rare_out.contains(">&amp;<rt>&lt;i&gt;</rt></ruby>"));

        let phrase_out = annotator.annotate("A&B");
        assert_eq!(phrase_out, "<ruby>A&amp;<rt>&lt;x&gt;</rt>B<rt>b</rt></ruby>");
    }
}
