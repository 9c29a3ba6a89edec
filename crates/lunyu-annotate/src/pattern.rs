use std::cmp::Reverse;
use std::collections::HashSet;

use lunyu_types::{Phrases, RareWords};
use regex::{Regex, RegexBuilder};
use thiserror::Error;

const REGEX_SIZE_LIMIT: usize = 64 * 1024 * 1024;

/// Which dictionary a key came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DictionaryKind {
    RareWord,
    Phrase,
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("empty {0:?} key in dictionary")]
    EmptyKey(DictionaryKind),
    #[error("failed to build pattern matcher: {0}")]
    Regex(#[from] regex::Error),
}

/// Ordered pattern keys plus the combined matcher built from them.
///
/// Keys are sorted by descending character count; equal lengths keep
/// dictionary order with phrase keys ahead of rare-word keys. The matcher is an
/// alternation in that order, and leftmost-first semantics make the longest key
/// win at any start position.
#[derive(Clone, Debug)]
pub struct PatternSet {
    keys: Vec<String>,
    matcher: Option<Regex>,
}

impl PatternSet {
    pub fn empty() -> Self {
        Self {
            keys: Vec::new(),
            matcher: None,
        }
    }

    pub fn compile(rare_words: &RareWords, phrases: &Phrases) -> Result<Self, CompileError> {
        let keys = ordered_keys(rare_words, phrases)?;
        if keys.is_empty() {
            return Ok(Self::empty());
        }

        let alternation = keys
            .iter()
            .map(|key| regex::escape(key))
            .collect::<Vec<_>>()
            .join("|");
        let matcher = RegexBuilder::new(&alternation)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()?;

        Ok(Self {
            keys,
            matcher: Some(matcher),
        })
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub(crate) fn matcher(&self) -> Option<&Regex> {
        self.matcher.as_ref()
    }
}

/// Distinct keys of both dictionaries, longest first, stable on ties.
pub fn ordered_keys(rare_words: &RareWords, phrases: &Phrases) -> Result<Vec<String>, CompileError> {
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(phrases.len() + rare_words.len());

    let tagged = phrases
        .keys()
        .map(|k| (k, DictionaryKind::Phrase))
        .chain(rare_words.keys().map(|k| (k, DictionaryKind::RareWord)));
    for (key, kind) in tagged {
        if key.is_empty() {
            return Err(CompileError::EmptyKey(kind));
        }
        if seen.insert(key.as_str()) {
            keys.push(key.clone());
        }
    }

    keys.sort_by_key(|k| Reverse(k.chars().count()));
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lunyu_types::{GlossInfo, PhraseUnit};

    fn rare(keys: &[&str]) -> RareWords {
        keys.iter()
            .map(|k| (k.to_string(), GlossInfo::default()))
            .collect()
    }

    fn phrases(keys: &[&str]) -> Phrases {
        keys.iter()
            .map(|k| {
                let units = k
                    .chars()
                    .map(|c| PhraseUnit::new(c.to_string(), "x"))
                    .collect();
                (k.to_string(), units)
            })
            .collect()
    }

    #[test]
    fn orders_longest_first_and_keeps_ties_stable() {
        let keys = ordered_keys(&rare(&["子", "說", "不亦"]), &phrases(&["夫子", "君子之道"])).unwrap();
        assert_eq!(keys, vec!["君子之道", "夫子", "不亦", "子", "說"]);
    }

    #[test]
    fn duplicate_keys_appear_once() {
        let keys = ordered_keys(&rare(&["夫子", "子"]), &phrases(&["夫子"])).unwrap();
        assert_eq!(keys, vec!["夫子", "子"]);
    }

    #[test]
    fn rejects_empty_key() {
        let err = ordered_keys(&rare(&[""]), &Phrases::new()).unwrap_err();
        assert!(matches!(err, CompileError::EmptyKey(DictionaryKind::RareWord)));
    }

    #[test]
    fn escapes_metacharacters() {
        let set = PatternSet::compile(&rare(&["a.b", "(", "*"]), &Phrases::new()).unwrap();
        let matcher = set.matcher().unwrap();
        assert!(matcher.is_match("a.b"));
        assert!(!matcher.is_match("axb"));
        assert!(matcher.is_match("("));
    }

    #[test]
    fn empty_dictionaries_have_no_matcher() {
        let set = PatternSet::compile(&RareWords::new(), &Phrases::new()).unwrap();
        assert!(set.is_empty());
        assert!(set.matcher().is_none());
    }
}
