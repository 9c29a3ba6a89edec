use regex::RegexBuilder;
use thiserror::Error;
use tracing::warn;

use crate::markup::{Segment, segments};

const HIGHLIGHT_OPEN: &str = r#"<span class="highlight">"#;
const HIGHLIGHT_CLOSE: &str = "</span>";

#[derive(Debug, Error)]
pub enum HighlightError {
    #[error("invalid search keyword {keyword:?}: {source}")]
    InvalidKeyword {
        keyword: String,
        #[source]
        source: regex::Error,
    },
}

/// Wrap case-insensitive hits of `keyword` in highlight spans.
///
/// The keyword is a user-typed pattern. Only literal runs are searched, never
/// tag text, and zero-length hits are ignored.
pub fn highlight(markup: &str, keyword: &str) -> Result<String, HighlightError> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return Ok(markup.to_string());
    }
    let re = RegexBuilder::new(keyword)
        .case_insensitive(true)
        .build()
        .map_err(|source| HighlightError::InvalidKeyword {
            keyword: keyword.to_string(),
            source,
        })?;

    let mut out = String::with_capacity(markup.len() + 32);
    for segment in segments(markup) {
        match segment {
            Segment::Tag(tag) => out.push_str(tag),
            Segment::Text(run) => {
                let mut last = 0;
                for m in re.find_iter(run).filter(|m| !m.is_empty()) {
                    out.push_str(&run[last..m.start()]);
                    out.push_str(HIGHLIGHT_OPEN);
                    out.push_str(m.as_str());
                    out.push_str(HIGHLIGHT_CLOSE);
                    last = m.end();
                }
                out.push_str(&run[last..]);
            }
        }
    }
    Ok(out)
}

/// [`highlight`], falling back to the unhighlighted markup on a bad keyword.
pub fn highlight_or_plain(markup: &str, keyword: &str) -> String {
    match highlight(markup, keyword) {
        Ok(out) => out,
        Err(err) => {
            warn!("{err}; rendering without highlight");
            markup.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_hits_outside_tags() {
        let out = highlight(r#"<a title="學">學而</a>時習"#, "學").unwrap();
        assert_eq!(
            out,
            r#"<a title="學"><span class="highlight">學</span>而</a>時習"#
        );
    }

    #[test]
    fn is_case_insensitive() {
        let out = highlight("Abc abc", "ABC").unwrap();
        assert_eq!(
            out,
            r#"<span class="highlight">Abc</span> <span class="highlight">abc</span>"#
        );
    }

    #[test]
    fn blank_keyword_is_identity() {
        assert_eq!(highlight("text", "  ").unwrap(), "text");
    }

    #[test]
    fn malformed_keyword_falls_back() {
        assert!(highlight("學而", "(").is_err());
        assert_eq!(highlight_or_plain("學而", "("), "學而");
    }

    #[test]
    fn zero_length_hits_are_skipped() {
        assert_eq!(highlight("abc", "x*").unwrap(), "abc");
    }
}
