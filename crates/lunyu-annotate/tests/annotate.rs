use lunyu_annotate::{Annotator, normalize_strikeout};
use lunyu_types::{GlossInfo, PhraseUnit, Phrases, RareWords};

fn gloss(phonetic: &str) -> GlossInfo {
    GlossInfo {
        phonetic: Some(phonetic.to_string()),
        definition: Some("def".to_string()),
    }
}

fn fixture() -> Annotator {
    let mut rare = RareWords::new();
    rare.insert("子".into(), gloss("ㄗˇ"));
    rare.insert("說".into(), gloss("ㄩㄝˋ"));
    let mut phrases = Phrases::new();
    phrases.insert(
        "夫子".into(),
        vec![PhraseUnit::new("夫", "ㄈㄨˊ"), PhraseUnit::new("子", "ㄗˇ")],
    );
    phrases.insert(
        "三省吾身".into(),
        vec![PhraseUnit::new("三省", "ㄙㄢ ㄒㄧㄥˇ"), PhraseUnit::new("吾身", "ㄨˊ ㄕㄣ")],
    );
    Annotator::new(rare, phrases).unwrap()
}

/// Base text of a ruby group: everything outside `<rt>...</rt>` and tags.
fn ruby_base(markup: &str) -> String {
    let mut out = String::new();
    let mut in_rt = false;
    let mut rest = markup;
    while let Some(start) = rest.find('<') {
        if !in_rt {
            out.push_str(&rest[..start]);
        }
        let end = rest[start..].find('>').map(|e| start + e + 1).unwrap();
        let tag = &rest[start..end];
        if tag == "<rt>" {
            in_rt = true;
        } else if tag == "</rt>" {
            in_rt = false;
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

#[test]
fn text_without_patterns_only_normalizes_strikeout() {
    let annotator = fixture();
    for text in ["學而時習之", "有朋~~自~~遠方來", "", "a < b > c"] {
        assert_eq!(annotator.annotate(text), normalize_strikeout(text));
    }
}

#[test]
fn longest_match_wins() {
    let annotator = fixture();
    let out = annotator.annotate("夫子");
    assert_eq!(out, "<ruby>夫<rt>ㄈㄨˊ</rt>子<rt>ㄗˇ</rt></ruby>");
    assert_eq!(out.matches("<ruby").count(), 1);
    assert!(!out.contains("rare-char"));
}

#[test]
fn phrase_group_reconstructs_key() {
    let annotator = fixture();
    let out = annotator.annotate("三省吾身");
    assert_eq!(out.matches("<ruby>").count(), 1);
    assert_eq!(ruby_base(&out), "三省吾身");
}

#[test]
fn shorter_key_still_matches_elsewhere() {
    let annotator = fixture();
    let out = annotator.annotate("夫子曰君子");
    assert_eq!(out.matches("<ruby>").count(), 1);
    assert_eq!(out.matches(r#"class="rare-char""#).count(), 1);
    assert_eq!(ruby_base(&out), "夫子曰君子");
}

#[test]
fn existing_ruby_is_not_reannotated() {
    let annotator = fixture();
    let input = "<ruby>君子<rt>子說</rt></ruby>不亦樂乎";
    assert_eq!(annotator.annotate(input), input);
}

#[test]
fn annotating_twice_is_stable() {
    let annotator = fixture();
    let once = annotator.annotate("夫子說：君子");
    let twice = annotator.annotate(&once);
    assert_eq!(once, twice);
}

#[test]
fn strikeout_contents_are_annotated() {
    let annotator = fixture();
    let out = annotator.annotate("~~夫子~~");
    assert_eq!(out, "<s><ruby>夫<rt>ㄈㄨˊ</rt>子<rt>ㄗˇ</rt></ruby></s>");
}

#[test]
fn phrase_definition_beats_rare_word_with_same_key() {
    let mut rare = RareWords::new();
    rare.insert("夫子".into(), gloss("wrong"));
    let mut phrases = Phrases::new();
    phrases.insert(
        "夫子".into(),
        vec![PhraseUnit::new("夫", "a"), PhraseUnit::new("子", "b")],
    );
    let annotator = Annotator::new(rare, phrases).unwrap();
    assert_eq!(
        annotator.annotate("夫子"),
        "<ruby>夫<rt>a</rt>子<rt>b</rt></ruby>"
    );
}

#[test]
fn metacharacter_keys_match_literally() {
    let mut rare = RareWords::new();
    rare.insert("(".into(), gloss("p"));
    let annotator = Annotator::new(rare, Phrases::new()).unwrap();
    let out = annotator.annotate("a(b");
    assert!(out.starts_with("a<ruby class=\"rare-char\""));
    assert!(out.ends_with("</ruby>b"));
}
