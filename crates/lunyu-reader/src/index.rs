use std::collections::{BTreeMap, BTreeSet};

use lunyu_annotate::{Annotator, Identifier};
use lunyu_types::{Chapter, HistoryEntry, TimelineEntry, VerseEntry};
use tracing::debug;

/// The protagonist shows up in nearly every timeline event, so the timeline
/// view leaves him out of its character list.
pub const TIMELINE_EXCLUDED: &[&str] = &["孔子"];

const ROMAN: [&str; 20] = [
    "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII", "XIII", "XIV", "XV",
    "XVI", "XVII", "XVIII", "XIX", "XX",
];

/// Immutable, flattened view of the whole corpus.
#[derive(Clone, Debug, Default)]
pub struct FlatIndex {
    verses: Vec<VerseEntry>,
    timeline: Vec<TimelineEntry>,
}

impl FlatIndex {
    /// Flatten chapters into verse entries with ids from 1, annotate every
    /// text once and attach timeline cross-links.
    pub fn build(
        chapters: &[Chapter],
        history: &[HistoryEntry],
        annotator: &Annotator,
        identifier: &Identifier,
    ) -> Self {
        let links = reference_map(history);
        let mut verses = Vec::with_capacity(chapters.iter().map(|c| c.verses.len()).sum());
        let mut next_id: u32 = 1;

        for (position, chapter) in chapters.iter().enumerate() {
            let ordinal = chapter
                .roman
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| roman_ordinal(position + 1));
            for (verse_idx, source) in chapter.verses.iter().enumerate() {
                let record = source.clone().into_record();
                let short_citation = format!("{}-{}", ordinal, verse_idx + 1);
                let citation = format!("{} {}", chapter.chapter, short_citation);
                let full_citation = format!("{} {}", next_id, citation);
                let history = linked_history(&record.text, &links);
                verses.push(VerseEntry {
                    global_id: next_id,
                    citation,
                    short_citation,
                    full_citation,
                    annotated_text: annotator.annotate(&record.text),
                    characters: identifier.identify(&record.text),
                    raw_text: record.text,
                    manual_tags: record.tags,
                    idioms: record.idioms,
                    translation: record.translation.filter(|t| !t.trim().is_empty()),
                    history,
                });
                next_id += 1;
            }
        }

        let timeline = history
            .iter()
            .map(|entry| TimelineEntry {
                id: entry.id,
                annotated_content: annotator.annotate(&entry.content),
                characters: identifier.identify_excluding(&entry.content, TIMELINE_EXCLUDED),
                content: entry.content.clone(),
                age: entry.age,
                year: entry.year,
                links: entry.links.clone(),
                annotated_note: entry
                    .note
                    .as_deref()
                    .filter(|n| !n.trim().is_empty())
                    .map(|n| annotator.annotate(n)),
            })
            .collect();

        Self { verses, timeline }
    }

    /// Wrap already-built entries, sorted by id; the timeline is empty.
    pub fn from_verses(mut verses: Vec<VerseEntry>) -> Self {
        verses.sort_by_key(|v| v.global_id);
        Self {
            verses,
            timeline: Vec::new(),
        }
    }

    pub fn verses(&self) -> &[VerseEntry] {
        &self.verses
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    pub fn len(&self) -> usize {
        self.verses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }

    pub fn verse(&self, global_id: u32) -> Option<&VerseEntry> {
        self.verses
            .binary_search_by_key(&global_id, |v| v.global_id)
            .ok()
            .map(|idx| &self.verses[idx])
    }
}

/// `I`..`XX`, then plain decimal.
pub fn roman_ordinal(position: usize) -> String {
    match position {
        1..=20 => ROMAN[position - 1].to_string(),
        _ => position.to_string(),
    }
}

/// Distinct link reference -> ids of the timeline entries declaring it.
fn reference_map(history: &[HistoryEntry]) -> BTreeMap<&str, BTreeSet<u32>> {
    let mut map: BTreeMap<&str, BTreeSet<u32>> = BTreeMap::new();
    for entry in history {
        for link in &entry.links {
            let reference = link.reference.trim();
            if reference.is_empty() {
                debug!("timeline entry {} has an empty link reference", entry.id);
                continue;
            }
            map.entry(reference).or_default().insert(entry.id);
        }
    }
    map
}

// Plain substring containment: a short reference can link verses that merely
// contain the same characters.
fn linked_history(raw_text: &str, links: &BTreeMap<&str, BTreeSet<u32>>) -> Vec<u32> {
    let mut ids = BTreeSet::new();
    for (reference, entries) in links {
        if raw_text.contains(reference) {
            ids.extend(entries.iter().copied());
        }
    }
    ids.into_iter().collect()
}
