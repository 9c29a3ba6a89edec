//! Text annotation for the Analects reader.
//!
//! Given raw verse text, a rare-word dictionary, and a phrase dictionary, the
//! [`Annotator`] emits one linear string where hard-to-read spans become ruby
//! markup. The pipeline:
//! 1. Rewrite `~~struck~~` spans as `<s>struck</s>`.
//! 2. Split into literal runs and tags; tags pass through untouched.
//! 3. Scan each literal run once with a combined, longest-first matcher, so no
//!    character is consumed by two substitutions.
//! 4. Phrase hits render as a ruby group per unit; rare-word hits render as an
//!    interactive element carrying escaped lookup metadata.
//!
//! [`Identifier`] finds which known figures a text mentions, and
//! [`highlight`] marks search keywords without touching markup.
//!
//! # Example
//! ```rust
//! use lunyu_annotate::Annotator;
//! use lunyu_types::{GlossInfo, PhraseUnit, Phrases, RareWords};
//!
//! let mut rare = RareWords::new();
//! rare.insert("子".into(), GlossInfo { phonetic: Some("ㄗˇ".into()), definition: None });
//! let mut phrases = Phrases::new();
//! phrases.insert(
//!     "夫子".into(),
//!     vec![PhraseUnit::new("夫", "ㄈㄨˊ"), PhraseUnit::new("子", "ㄗˇ")],
//! );
//!
//! let annotator = Annotator::new(rare, phrases).unwrap();
//! assert_eq!(
//!     annotator.annotate("夫子"),
//!     "<ruby>夫<rt>ㄈㄨˊ</rt>子<rt>ㄗˇ</rt></ruby>"
//! );
//! ```

pub mod annotate;
pub mod highlight;
pub mod identify;
pub mod markup;
pub mod pattern;

pub use annotate::{Annotator, escape_metadata, normalize_strikeout};
pub use highlight::{HighlightError, highlight, highlight_or_plain};
pub use identify::Identifier;
pub use pattern::{CompileError, DictionaryKind, PatternSet, ordered_keys};
