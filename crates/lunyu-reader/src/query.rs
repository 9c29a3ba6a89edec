//! Filtering, ordering and pagination over the flat index.
//!
//! Filters borrow from the immutable index and return a fresh list of
//! references; ordering always works on that per-request copy.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use lunyu_types::{Category, Entity, VerseEntry};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use thiserror::Error;

use crate::index::FlatIndex;

/// How a filtered verse list is ordered.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderMode {
    #[default]
    Sequential,
    Random,
    /// Translated verses first, then tagged, then idioms, then the rest; each
    /// bucket shuffled.
    Grouped,
}

impl OrderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderMode::Sequential => "sequential",
            OrderMode::Random => "random",
            OrderMode::Grouped => "grouped",
        }
    }

    pub fn is_shuffled(self) -> bool {
        !matches!(self, OrderMode::Sequential)
    }
}

impl fmt::Display for OrderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown order {0:?}, expected sequential, random or grouped")]
pub struct UnknownOrderMode(pub String);

impl FromStr for OrderMode {
    type Err = UnknownOrderMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "sequential" | "id" => Ok(OrderMode::Sequential),
            "random" | "shuffle" => Ok(OrderMode::Random),
            "grouped" | "hashtag" => Ok(OrderMode::Grouped),
            _ => Err(UnknownOrderMode(s.to_string())),
        }
    }
}

/// Per-request filter and sort state. Every present filter must hold.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ViewQuery {
    pub keyword: Option<String>,
    pub character: Option<String>,
    pub hashtag: Option<String>,
    pub idiom: Option<String>,
    pub mode: OrderMode,
}

impl ViewQuery {
    /// Keyword with surrounding whitespace removed; blank means none.
    pub fn keyword(&self) -> Option<&str> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

/// Raw text or short citation contains `keyword`, case-sensitively.
pub fn by_keyword<'a>(list: &[&'a VerseEntry], keyword: &str) -> Vec<&'a VerseEntry> {
    list.iter()
        .copied()
        .filter(|v| v.raw_text.contains(keyword) || v.short_citation.contains(keyword))
        .collect()
}

pub fn by_character<'a>(list: &[&'a VerseEntry], canonical_name: &str) -> Vec<&'a VerseEntry> {
    list.iter()
        .copied()
        .filter(|v| v.mentions(canonical_name))
        .collect()
}

pub fn by_hashtag<'a>(list: &[&'a VerseEntry], tag: &str) -> Vec<&'a VerseEntry> {
    list.iter()
        .copied()
        .filter(|v| v.manual_tags.iter().any(|t| t == tag))
        .collect()
}

pub fn by_idiom<'a>(list: &[&'a VerseEntry], idiom: &str) -> Vec<&'a VerseEntry> {
    list.iter()
        .copied()
        .filter(|v| v.idioms.iter().any(|i| i == idiom))
        .collect()
}

/// Bucket rank for [`OrderMode::Grouped`].
fn group_rank(verse: &VerseEntry) -> usize {
    if verse.has_translation() {
        0
    } else if !verse.manual_tags.is_empty() {
        1
    } else if !verse.idioms.is_empty() {
        2
    } else {
        3
    }
}

/// Reorder `list` in place.
pub fn order<T, R>(list: &mut Vec<T>, mode: OrderMode, rng: &mut R)
where
    T: Borrow<VerseEntry>,
    R: Rng + ?Sized,
{
    match mode {
        OrderMode::Sequential => list.sort_by_key(|v| v.borrow().global_id),
        OrderMode::Random => list.shuffle(rng),
        OrderMode::Grouped => {
            let mut buckets: [Vec<T>; 4] = Default::default();
            for item in list.drain(..) {
                let rank = group_rank(item.borrow());
                buckets[rank].push(item);
            }
            for mut bucket in buckets {
                bucket.shuffle(rng);
                list.append(&mut bucket);
            }
        }
    }
}

/// Filter the index by every filter present in `query`, then order.
pub fn apply<'a, R>(index: &'a FlatIndex, query: &ViewQuery, rng: &mut R) -> Vec<&'a VerseEntry>
where
    R: Rng + ?Sized,
{
    let mut list: Vec<&VerseEntry> = index.verses().iter().collect();
    if let Some(name) = query.character.as_deref() {
        list = by_character(&list, name);
    }
    if let Some(tag) = query.hashtag.as_deref() {
        list = by_hashtag(&list, tag);
    }
    if let Some(idiom) = query.idiom.as_deref() {
        list = by_idiom(&list, idiom);
    }
    if let Some(keyword) = query.keyword() {
        list = by_keyword(&list, keyword);
    }
    order(&mut list, query.mode, rng);
    list
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TagCount {
    pub value: String,
    pub count: usize,
}

/// Distinct manual tags, first-seen order.
pub fn hashtags(index: &FlatIndex) -> Vec<TagCount> {
    count_distinct(index.verses().iter().flat_map(|v| v.manual_tags.iter()))
}

/// Distinct idioms, first-seen order.
pub fn idioms(index: &FlatIndex) -> Vec<TagCount> {
    count_distinct(index.verses().iter().flat_map(|v| v.idioms.iter()))
}

fn count_distinct<'a>(values: impl Iterator<Item = &'a String>) -> Vec<TagCount> {
    let mut counts: IndexMap<&str, usize> = IndexMap::new();
    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        *counts.entry(value).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(value, count)| TagCount {
            value: value.to_string(),
            count,
        })
        .collect()
}

/// Entities of one category (or all of them), in table order.
pub fn characters_in(entities: &[Entity], category: Option<Category>) -> Vec<&Entity> {
    entities
        .iter()
        .filter(|e| category.is_none_or(|c| e.category == c))
        .collect()
}

/// One page of a longer list.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub has_more: bool,
}

/// Largest seed a browser can echo back unchanged: JSON numbers are parsed as
/// IEEE doubles, which hold integers exactly only up to 2^53 - 1.
pub const MAX_SEED: u64 = (1 << 53) - 1;

/// A fresh shuffle seed that survives a round trip through JavaScript.
pub fn fresh_seed<R: Rng + ?Sized>(rng: &mut R) -> u64 {
    rng.r#gen::<u64>() & MAX_SEED
}

/// `page` is 1-based; callers validate both arguments are at least 1.
pub fn paginate<T>(list: Vec<T>, page: usize, page_size: usize) -> Page<T> {
    let total = list.len();
    let start = page.saturating_sub(1).saturating_mul(page_size);
    let items: Vec<T> = list.into_iter().skip(start).take(page_size).collect();
    let has_more = start.saturating_add(items.len()) < total;
    Page {
        items,
        total,
        has_more,
    }
}
