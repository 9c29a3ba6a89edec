//! Load the Analects corpus documents from a data directory.
//!
//! Four documents are required and one is optional:
//!
//! | file | contents |
//! |---|---|
//! | `rareWords.json` | `{ "字": { "zhuyin": "...", "definition": "..." } }` |
//! | `rarePhrases.json` | `{ "夫子": ["夫", "ㄈㄨˊ", "子", "ㄗˇ"] }` |
//! | `characters.json` | `[ { "goBy": "...", "searchKeys": [...], ... } ]` |
//! | `lunyu.json` | `[ { "chapter": "學而", "roman": "I", "verses": [...] } ]` |
//! | `history.json` (optional) | `[ { "id": 1, "content": "...", "links": [...] } ]` |
//!
//! Any failure on a required document is fatal and reported as a
//! [`LoadError`] naming the file. Nothing is partially loaded.
//!
//! ```no_run
//! use lunyu_db::Corpus;
//!
//! # fn main() -> Result<(), lunyu_db::LoadError> {
//! let corpus = Corpus::load("data")?;
//! println!("{} chapters", corpus.chapters.len());
//! # Ok(()) }
//! ```
//!
//! For a runnable summary, see `cargo run -p lunyu-db --example stats -- <data-dir>`.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use lunyu_types::{Chapter, Entity, HistoryEntry, PhraseUnit, Phrases, RareWords};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

pub const RARE_WORDS_FILE: &str = "rareWords.json";
pub const PHRASES_FILE: &str = "rarePhrases.json";
pub const CHARACTERS_FILE: &str = "characters.json";
pub const CHAPTERS_FILE: &str = "lunyu.json";
pub const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("missing required corpus file: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid phrase {key:?}: {reason}")]
    InvalidPhrase { key: String, reason: String },
    #[error("invalid rare word entry: {0}")]
    InvalidRareWord(String),
    #[error("invalid character record #{index}: {reason}")]
    InvalidEntity { index: usize, reason: String },
}

/// Everything the reader needs, validated.
#[derive(Clone, Debug, Default)]
pub struct Corpus {
    pub rare_words: RareWords,
    pub phrases: Phrases,
    pub entities: Vec<Entity>,
    pub chapters: Vec<Chapter>,
    pub history: Vec<HistoryEntry>,
}

impl Corpus {
    /// Load and validate all documents under `data_dir`.
    pub fn load(data_dir: impl AsRef<Path>) -> Result<Self, LoadError> {
        let dir = data_dir.as_ref();
        for name in [RARE_WORDS_FILE, PHRASES_FILE, CHARACTERS_FILE, CHAPTERS_FILE] {
            let path = dir.join(name);
            if !path.exists() {
                return Err(LoadError::Missing(path));
            }
        }

        let rare_words: RareWords = read_json(&dir.join(RARE_WORDS_FILE))?;
        let raw_phrases: IndexMap<String, Vec<String>> = read_json(&dir.join(PHRASES_FILE))?;
        let entities: Vec<Entity> = read_json(&dir.join(CHARACTERS_FILE))?;
        let chapters: Vec<Chapter> = read_json(&dir.join(CHAPTERS_FILE))?;

        let history_path = dir.join(HISTORY_FILE);
        let history: Vec<HistoryEntry> = if history_path.exists() {
            read_json(&history_path)?
        } else {
            debug!("no {} in {}, timeline is empty", HISTORY_FILE, dir.display());
            Vec::new()
        };

        let corpus = Self::from_parts(rare_words, raw_phrases, entities, chapters, history)?;
        info!(
            "loaded corpus: {} rare words, {} phrases, {} characters, {} chapters, {} verses, {} timeline entries",
            corpus.rare_words.len(),
            corpus.phrases.len(),
            corpus.entities.len(),
            corpus.chapters.len(),
            corpus.verse_count(),
            corpus.history.len()
        );
        Ok(corpus)
    }

    /// Validate already-decoded documents.
    pub fn from_parts(
        rare_words: RareWords,
        raw_phrases: IndexMap<String, Vec<String>>,
        entities: Vec<Entity>,
        chapters: Vec<Chapter>,
        history: Vec<HistoryEntry>,
    ) -> Result<Self, LoadError> {
        if rare_words.keys().any(|k| k.is_empty()) {
            return Err(LoadError::InvalidRareWord("empty key".to_string()));
        }
        let phrases = parse_phrases(raw_phrases)?;
        let entities = normalize_entities(entities)?;
        Ok(Self {
            rare_words,
            phrases,
            entities,
            chapters,
            history,
        })
    }

    pub fn verse_count(&self) -> usize {
        self.chapters.iter().map(|c| c.verses.len()).sum()
    }

    pub fn entity(&self, canonical_name: &str) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.canonical_name == canonical_name)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| LoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Pair up flat `[display, gloss, display, gloss, ...]` lists.
///
/// The display units of each phrase must concatenate back to its key.
pub fn parse_phrases(raw: IndexMap<String, Vec<String>>) -> Result<Phrases, LoadError> {
    let mut phrases = Phrases::with_capacity(raw.len());
    for (key, parts) in raw {
        if key.is_empty() {
            return Err(LoadError::InvalidPhrase {
                key,
                reason: "empty key".to_string(),
            });
        }
        if parts.is_empty() || parts.len() % 2 != 0 {
            return Err(LoadError::InvalidPhrase {
                key,
                reason: format!(
                    "expected alternating display/gloss units, got {} items",
                    parts.len()
                ),
            });
        }
        let units: Vec<PhraseUnit> = parts
            .chunks_exact(2)
            .map(|pair| PhraseUnit::new(pair[0].clone(), pair[1].clone()))
            .collect();
        let rebuilt: String = units.iter().map(|u| u.display.as_str()).collect();
        if rebuilt != key {
            return Err(LoadError::InvalidPhrase {
                key,
                reason: format!("display units spell {rebuilt:?}"),
            });
        }
        phrases.insert(key, units);
    }
    Ok(phrases)
}

/// Reject nameless records; an entity without search keys is found by its
/// canonical name.
fn normalize_entities(entities: Vec<Entity>) -> Result<Vec<Entity>, LoadError> {
    entities
        .into_iter()
        .enumerate()
        .map(|(index, mut entity)| {
            if entity.canonical_name.trim().is_empty() {
                return Err(LoadError::InvalidEntity {
                    index,
                    reason: "empty goBy".to_string(),
                });
            }
            entity.search_aliases.retain(|alias| !alias.is_empty());
            if entity.search_aliases.is_empty() {
                debug!(
                    "character {} has no search keys, using its name",
                    entity.canonical_name
                );
                entity.search_aliases.push(entity.canonical_name.clone());
            }
            Ok(entity)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entries: &[(&str, &[&str])]) -> IndexMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    #[test]
    fn pairs_phrase_units_in_order() {
        let phrases = parse_phrases(raw(&[("夫子", &["夫", "ㄈㄨˊ", "子", "ㄗˇ"])])).unwrap();
        assert_eq!(
            phrases["夫子"],
            vec![PhraseUnit::new("夫", "ㄈㄨˊ"), PhraseUnit::new("子", "ㄗˇ")]
        );
    }

    #[test]
    fn multi_character_display_units_are_allowed() {
        let phrases = parse_phrases(raw(&[("三省吾身", &["三省", "a", "吾身", "b"])])).unwrap();
        assert_eq!(phrases["三省吾身"].len(), 2);
    }

    #[test]
    fn rejects_odd_unit_lists() {
        let err = parse_phrases(raw(&[("夫子", &["夫", "ㄈㄨˊ", "子"])])).unwrap_err();
        assert!(err.to_string().contains("alternating"));
    }

    #[test]
    fn rejects_units_that_do_not_spell_key() {
        let err = parse_phrases(raw(&[("夫子", &["夫", "a", "人", "b"])])).unwrap_err();
        assert!(matches!(err, LoadError::InvalidPhrase { .. }));
    }

    #[test]
    fn phrases_keep_document_order() {
        let phrases = parse_phrases(raw(&[("乙乙", &["乙乙", "x"]), ("甲甲", &["甲甲", "y"])])).unwrap();
        let keys: Vec<_> = phrases.keys().cloned().collect();
        assert_eq!(keys, vec!["乙乙", "甲甲"]);
    }

    #[test]
    fn entity_without_keys_searches_by_name() {
        let entities = normalize_entities(vec![Entity {
            canonical_name: "曾子".to_string(),
            search_aliases: vec![String::new()],
            ..Entity::default()
        }])
        .unwrap();
        assert_eq!(entities[0].search_aliases, vec!["曾子"]);
    }

    #[test]
    fn nameless_entity_is_rejected() {
        let err = normalize_entities(vec![Entity::default()]).unwrap_err();
        assert!(matches!(err, LoadError::InvalidEntity { index: 0, .. }));
    }
}
