use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use lunyu_db::Corpus;
use lunyu_types::VerseSource;

fn main() -> Result<()> {
    let data_dir = env::args()
        .nth(1)
        .map(PathBuf::from)
        .context("usage: cargo run -p lunyu-db --example stats -- <path-to-data-dir>")?;

    let corpus = Corpus::load(&data_dir)
        .with_context(|| format!("loading corpus from {}", data_dir.display()))?;

    let mut structured = 0usize;
    let mut translated = 0usize;
    let mut tag_count = 0usize;
    let mut idiom_count = 0usize;
    for chapter in &corpus.chapters {
        for verse in &chapter.verses {
            if let VerseSource::Record(record) = verse {
                structured += 1;
                tag_count += record.tags.len();
                idiom_count += record.idioms.len();
                if record.translation.as_deref().is_some_and(|t| !t.trim().is_empty()) {
                    translated += 1;
                }
            }
        }
    }

    let mut by_category: BTreeMap<&str, usize> = BTreeMap::new();
    for entity in &corpus.entities {
        *by_category.entry(entity.category.label()).or_default() += 1;
    }

    println!("Data dir     : {}", data_dir.display());
    println!("Chapters     : {}", corpus.chapters.len());
    println!("Verses       : {}", corpus.verse_count());
    println!("  structured : {}", structured);
    println!("  translated : {}", translated);
    println!("  hashtags   : {}", tag_count);
    println!("  idioms     : {}", idiom_count);
    println!("Rare words   : {}", corpus.rare_words.len());
    println!("Phrases      : {}", corpus.phrases.len());
    println!("Characters   : {}", corpus.entities.len());
    for (label, count) in by_category {
        println!("  {label:<8} : {count}");
    }
    println!("Timeline     : {}", corpus.history.len());

    Ok(())
}
