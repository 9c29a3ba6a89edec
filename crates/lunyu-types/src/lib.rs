//! Shared types for the annotated Analects corpus.
//!
//! The on-disk documents (rare-word dictionary, phrase dictionary, character
//! table, chapters, timeline) deserialize straight into these types; field
//! names follow the JSON files (`zhuyin`, `goBy`, `searchKeys`, ...). Derived
//! records produced by the indexer ([`VerseEntry`], [`MatchedEntity`]) use
//! snake_case on the wire.
//!
//! Dictionaries are insertion-ordered ([`IndexMap`]) because pattern priority
//! ties are broken by document order.
//!
//! ```rust
//! use lunyu_types::{Category, VerseSource};
//!
//! assert_eq!(Category::from_label("古人"), Category::Ancient);
//! let verse: VerseSource = serde_json::from_str(r#""學而時習之""#).unwrap();
//! assert_eq!(verse.text(), "學而時習之");
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Pronunciation and definition for one rare character or short string.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct GlossInfo {
    #[serde(rename = "zhuyin", default, skip_serializing_if = "Option::is_none")]
    pub phonetic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
}

impl GlossInfo {
    /// Phonetic gloss, treating an empty string as absent.
    pub fn phonetic(&self) -> Option<&str> {
        self.phonetic.as_deref().filter(|s| !s.is_empty())
    }

    pub fn definition(&self) -> &str {
        self.definition.as_deref().unwrap_or_default()
    }
}

/// Rare-word dictionary in document order.
pub type RareWords = IndexMap<String, GlossInfo>;

/// One `(display, gloss)` pair of a phrase breakdown.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PhraseUnit {
    pub display: String,
    pub gloss: String,
}

impl PhraseUnit {
    pub fn new(display: impl Into<String>, gloss: impl Into<String>) -> Self {
        Self {
            display: display.into(),
            gloss: gloss.into(),
        }
    }
}

/// Phrase dictionary in document order. Display units of each value
/// concatenate back to the key.
pub type Phrases = IndexMap<String, Vec<PhraseUnit>>;

/// Fixed grouping used by the character gallery.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    /// 孔門諸賢
    Disciple,
    /// 魯國人
    Lu,
    /// 外國人
    Foreign,
    /// 古人
    Ancient,
    /// 其他
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Disciple,
        Category::Lu,
        Category::Foreign,
        Category::Ancient,
        Category::Other,
    ];

    /// Parse a category label; unknown labels fall back to [`Category::Other`].
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "孔門諸賢" => Category::Disciple,
            "魯國人" => Category::Lu,
            "外國人" => Category::Foreign,
            "古人" => Category::Ancient,
            _ => Category::Other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Disciple => "孔門諸賢",
            Category::Lu => "魯國人",
            Category::Foreign => "外國人",
            Category::Ancient => "古人",
            Category::Other => "其他",
        }
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Category::from_label(&value)
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.label().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A named figure of the text, with the aliases used to detect mentions.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "goBy")]
    pub canonical_name: String,
    /// Tried in order; the first hit is the reported alias.
    #[serde(rename = "searchKeys", default)]
    pub search_aliases: Vec<String>,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub relation: String,
    #[serde(rename = "wikipedia", default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(rename = "picture", default, skip_serializing_if = "Option::is_none")]
    pub portrait: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cadet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Display-only alternative names ("又稱").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

/// Which entity a text mentions, and through which alias.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MatchedEntity {
    pub name: String,
    pub matched: String,
}

impl MatchedEntity {
    pub fn new(name: impl Into<String>, matched: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matched: matched.into(),
        }
    }
}

/// A verse as written in the chapter file: a bare string or a record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VerseSource {
    Text(String),
    Record(VerseRecord),
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VerseRecord {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub idioms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

impl VerseSource {
    pub fn text(&self) -> &str {
        match self {
            VerseSource::Text(text) => text,
            VerseSource::Record(record) => &record.text,
        }
    }

    /// Normalize to a record; bare strings carry no tags, idioms or translation.
    pub fn into_record(self) -> VerseRecord {
        match self {
            VerseSource::Text(text) => VerseRecord {
                text,
                ..VerseRecord::default()
            },
            VerseSource::Record(record) => record,
        }
    }
}

/// One book (篇) of the corpus.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub chapter: String,
    /// Roman ordinal; derived from the chapter position when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roman: Option<String>,
    #[serde(default)]
    pub verses: Vec<VerseSource>,
}

/// Flattened, enriched verse produced by the indexer.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VerseEntry {
    pub global_id: u32,
    /// `學而 I-1`
    pub citation: String,
    /// `I-1`
    pub short_citation: String,
    /// `1 學而 I-1`
    pub full_citation: String,
    pub raw_text: String,
    pub annotated_text: String,
    pub manual_tags: Vec<String>,
    pub idioms: Vec<String>,
    pub translation: Option<String>,
    pub characters: Vec<MatchedEntity>,
    /// Ids of timeline entries whose link references occur in `raw_text`.
    pub history: Vec<u32>,
}

impl VerseEntry {
    pub fn has_translation(&self) -> bool {
        self.translation
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }

    pub fn mentions(&self, canonical_name: &str) -> bool {
        self.characters.iter().any(|c| c.name == canonical_name)
    }
}

/// A link from a timeline entry to a verse citation.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HistoryLink {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub text: String,
}

/// One event of the companion timeline.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u32,
    pub content: String,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub links: Vec<HistoryLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// A timeline event prepared for display: annotated text plus the figures it
/// mentions.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: u32,
    pub content: String,
    pub annotated_content: String,
    pub age: Option<i32>,
    pub year: Option<i32>,
    pub links: Vec<HistoryLink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_note: Option<String>,
    pub characters: Vec<MatchedEntity>,
}

impl TimelineEntry {
    /// Case-insensitive containment over content, age and year.
    pub fn matches(&self, keyword: &str) -> bool {
        let needle = keyword.to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.content.to_lowercase().contains(&needle)
            || self.age.is_some_and(|age| age.to_string().contains(&needle))
            || self.year.is_some_and(|year| year.to_string().contains(&needle))
    }
}
