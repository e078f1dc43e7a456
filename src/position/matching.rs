//! Text matching strategies
//!
//! The three content-driven search strategies the cascade runs when the
//! stored offsets no longer line up: context-pattern search, fingerprint
//! window search, and fuzzy/regex search. Also home to the similarity
//! metrics shared across the positioning module.
//!
//! Every offset handed in or out of this module is a character offset;
//! regex byte positions are converted at the boundary.

use regex::{Regex, RegexBuilder};

use crate::fingerprint;

use super::types::{AnnotationPosition, TextRange};

/// Maximum character gap the context pattern tolerates between the stored
/// before/after context strings.
const CONTEXT_GAP_MAX: usize = 200;

/// Shingle-Jaccard gate for the fingerprint window scan.
const FINGERPRINT_JACCARD_GATE: f64 = 0.3;

/// Raw-text similarity a gated fingerprint window must reach.
const FINGERPRINT_SIMILARITY_GATE: f64 = 0.8;

/// Similarity a fuzzy regex match must reach.
const FUZZY_SIMILARITY_GATE: f64 = 0.6;

/// Fixed confidence of the normalized-substring fallback.
const FUZZY_FALLBACK_CONFIDENCE: f64 = 0.8;

// ---------------------------------------------------------------------------
// Character-offset helpers
// ---------------------------------------------------------------------------

/// Character length of a string.
pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the `char_idx`-th character, or `None` past the end.
pub(crate) fn char_to_byte(s: &str, char_idx: usize) -> Option<usize> {
    let mut seen = 0;
    for (byte_idx, _) in s.char_indices() {
        if seen == char_idx {
            return Some(byte_idx);
        }
        seen += 1;
    }
    (seen == char_idx).then_some(s.len())
}

/// Character offset of a byte index (which must lie on a char boundary).
pub(crate) fn byte_to_char(s: &str, byte_idx: usize) -> usize {
    s[..byte_idx].chars().count()
}

/// Slice by character offsets. `None` when the range is reversed or out of
/// bounds.
pub(crate) fn char_slice(s: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let byte_start = char_to_byte(s, start)?;
    let byte_end = char_to_byte(s, end)?;
    Some(&s[byte_start..byte_end])
}

// ---------------------------------------------------------------------------
// Similarity metrics
// ---------------------------------------------------------------------------

/// Normalize text for comparison: lowercase, collapse whitespace runs to a
/// single space, strip everything that is neither alphanumeric nor an
/// underscore. `char::is_alphanumeric` already covers CJK ideographs, so
/// 中文 text survives while full-width punctuation (：、。) is stripped.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_space = true; // swallows leading whitespace
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else if ch.is_alphanumeric() || ch == '_' {
            out.extend(ch.to_lowercase());
            prev_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Similarity of two texts in [0, 1].
///
/// 1.0 when identical, 0.95 when identical after [`normalize`], otherwise
/// the Jaccard similarity of the normalized token sets.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let na = normalize(a);
    let nb = normalize(b);
    if na == nb {
        return 0.95;
    }
    let ta: std::collections::HashSet<&str> = na.split_whitespace().collect();
    let tb: std::collections::HashSet<&str> = nb.split_whitespace().collect();
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / union as f64
}

/// Ratio of the shorter to the longer character length. 1.0 when both are
/// empty.
pub fn length_similarity(a: &str, b: &str) -> f64 {
    let la = char_len(a);
    let lb = char_len(b);
    let max = la.max(lb);
    if max == 0 {
        1.0
    } else {
        la.min(lb) as f64 / max as f64
    }
}

/// How close a candidate start offset is to the original one. The tolerance
/// scales with the original offset (10%) but never drops below 1000 chars.
pub fn position_similarity(candidate_start: usize, original_start: usize) -> f64 {
    let diff = candidate_start.abs_diff(original_start) as f64;
    let scale = (original_start as f64 * 0.1).max(1000.0);
    (1.0 - diff / scale).max(0.0)
}

// ---------------------------------------------------------------------------
// Context match
// ---------------------------------------------------------------------------

/// Find the span by locating its stored before/after context with a bounded
/// wildcard gap between them.
///
/// Multiple windows are scored by `0.3·position + 0.4·text + 0.3·length`
/// similarity of the gap against the original selection; within the winning
/// window the exact stored text wins at 0.95, otherwise the whole gap is
/// returned at 0.7.
pub fn context_search(document: &str, position: &AnnotationPosition) -> Option<TextRange> {
    let before = &position.context.before;
    let after = &position.context.after;
    if before.is_empty() && after.is_empty() {
        return None;
    }

    let pattern = format!(
        "(?s){}(.{{0,{CONTEXT_GAP_MAX}}}?){}",
        regex::escape(before),
        regex::escape(after)
    );
    let re = Regex::new(&pattern).ok()?;

    let selected = &position.primary.selected_text;
    let original_start = position.primary.start_offset;

    // (gap char start, gap text)
    let mut best: Option<(usize, &str)> = None;
    let mut best_score = f64::NEG_INFINITY;
    let mut candidates = 0;
    for caps in re.captures_iter(document) {
        let gap = match caps.get(1) {
            Some(g) => g,
            None => continue,
        };
        candidates += 1;
        let gap_start = byte_to_char(document, gap.start());
        let score = 0.3 * position_similarity(gap_start, original_start)
            + 0.4 * text_similarity(gap.as_str(), selected)
            + 0.3 * length_similarity(gap.as_str(), selected);
        if score > best_score {
            best_score = score;
            best = Some((gap_start, gap.as_str()));
        }
    }

    let (gap_start, gap_text) = best?;
    tracing::trace!(
        candidates,
        gap_start,
        score = best_score,
        "context pattern matched"
    );

    if let Some(byte_idx) = gap_text.find(selected.as_str()) {
        let start = gap_start + byte_to_char(gap_text, byte_idx);
        let end = start + char_len(selected);
        return Some(TextRange::new(start, end, selected.clone()).with_confidence(0.95));
    }

    let end = gap_start + char_len(gap_text);
    Some(TextRange::new(gap_start, end, gap_text).with_confidence(0.7))
}

// ---------------------------------------------------------------------------
// Fingerprint match
// ---------------------------------------------------------------------------

/// Slide a selection-sized window across the document and accept the first
/// window whose trigram identity gates against the stored fingerprint and
/// whose raw text similarity exceeds 0.8.
///
/// The stored digest alone cannot be Jaccard-compared, so the shingle set is
/// rebuilt from the carried context + selected text; digest equality is kept
/// as a fast path when the stored digest is informative (non-empty shingles).
pub fn fingerprint_search(document: &str, position: &AnnotationPosition) -> Option<TextRange> {
    let selected = &position.primary.selected_text;
    let win_len = char_len(selected);
    if win_len == 0 {
        return None;
    }

    let doc_chars: Vec<char> = document.chars().collect();
    if doc_chars.len() < win_len {
        return None;
    }

    let neighborhood = format!(
        "{}{}{}",
        position.context.before, selected, position.context.after
    );
    let stored_shingles = fingerprint::shingle_set(&neighborhood);
    let digest_informative = position.fingerprint != fingerprint::fingerprint("");
    if stored_shingles.is_empty() && !digest_informative {
        // Nothing can pass the gate; a window of short tokens shingles to
        // nothing and the stored digest carries no identity either.
        return None;
    }

    let step = (win_len / 4).max(1);
    let mut start = 0;
    while start + win_len <= doc_chars.len() {
        let window: String = doc_chars[start..start + win_len].iter().collect();

        let gated = (digest_informative && fingerprint::fingerprint(&window) == position.fingerprint)
            || (!stored_shingles.is_empty()
                && fingerprint::jaccard(&fingerprint::shingle_set(&window), &stored_shingles)
                    > FINGERPRINT_JACCARD_GATE);

        if gated {
            let sim = text_similarity(&window, selected);
            if sim > FINGERPRINT_SIMILARITY_GATE {
                tracing::trace!(start, sim, "fingerprint window accepted");
                return Some(TextRange::new(start, start + win_len, window).with_confidence(sim));
            }
        }
        start += step;
    }
    None
}

// ---------------------------------------------------------------------------
// Fuzzy match
// ---------------------------------------------------------------------------

/// Word-gap regex search, then a normalized-substring fallback.
///
/// `Err` carries a diagnostic only when the regex machinery itself failed
/// *and* the fallback found nothing; a plain miss is `Ok(None)`.
pub fn fuzzy_search(
    document: &str,
    position: &AnnotationPosition,
) -> Result<Option<TextRange>, String> {
    let selected = &position.primary.selected_text;
    let words: Vec<&str> = selected.split_whitespace().collect();

    let mut regex_error = None;
    if !words.is_empty() {
        let pattern = words
            .iter()
            .map(|w| regex::escape(w))
            .collect::<Vec<_>>()
            .join(r"\s*");
        match RegexBuilder::new(&pattern).case_insensitive(true).build() {
            Ok(re) => {
                for m in re.find_iter(document) {
                    let sim = text_similarity(m.as_str(), selected);
                    if sim > FUZZY_SIMILARITY_GATE {
                        let start = byte_to_char(document, m.start());
                        let end = start + char_len(m.as_str());
                        return Ok(Some(
                            TextRange::new(start, end, m.as_str()).with_confidence(sim),
                        ));
                    }
                }
            }
            Err(e) => regex_error = Some(e.to_string()),
        }
    }

    if let Some(range) = normalized_substring_search(document, selected) {
        return Ok(Some(range.with_confidence(FUZZY_FALLBACK_CONFIDENCE)));
    }

    match regex_error {
        Some(e) => Err(format!(
            "word-gap regex failed ({e}) and normalized fallback found nothing"
        )),
        None => Ok(None),
    }
}

/// Search for the normalized needle inside the normalized document, mapping
/// the hit back to original character offsets.
fn normalized_substring_search(document: &str, needle: &str) -> Option<TextRange> {
    let needle_norm = normalize(needle);
    if needle_norm.is_empty() {
        return None;
    }

    let (doc_norm, map) = normalize_with_map(document);
    let byte_idx = doc_norm.find(&needle_norm)?;

    let norm_start = byte_to_char(&doc_norm, byte_idx);
    let norm_end = norm_start + char_len(&needle_norm);
    let orig_start = *map.get(norm_start)?;
    let orig_end = *map.get(norm_end - 1)? + 1;

    let text = char_slice(document, orig_start, orig_end)?;
    Some(TextRange::new(orig_start, orig_end, text))
}

/// [`normalize`], but also return, for every char of the normalized output,
/// the original character offset it came from. Collapsed whitespace maps to
/// the first whitespace char of its run.
fn normalize_with_map(text: &str) -> (String, Vec<usize>) {
    let mut out = String::with_capacity(text.len());
    let mut map = Vec::new();
    let mut prev_space = true;
    for (idx, ch) in text.chars().enumerate() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                map.push(idx);
                prev_space = true;
            }
        } else if ch.is_alphanumeric() || ch == '_' {
            for lc in ch.to_lowercase() {
                out.push(lc);
                map.push(idx);
            }
            prev_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
        map.pop();
    }
    (out, map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::types::{ContextInfo, PositionMetadata, PrimaryPosition, StructuralPath};
    use chrono::Utc;

    fn position(
        start: usize,
        end: usize,
        selected: &str,
        before: &str,
        after: &str,
    ) -> AnnotationPosition {
        AnnotationPosition {
            primary: PrimaryPosition {
                start_offset: start,
                end_offset: end,
                selected_text: selected.to_string(),
            },
            context: ContextInfo {
                before: before.to_string(),
                after: after.to_string(),
                hash: crate::fingerprint::hash(&format!("{before}{selected}{after}")),
            },
            structural: StructuralPath::default(),
            fingerprint: crate::fingerprint::fingerprint(&format!("{before}{selected}{after}")),
            metadata: PositionMetadata {
                created_at: Utc::now(),
                text_length: char_len(selected),
                confidence: 0.5,
            },
        }
    }

    // --- char helpers ---

    #[test]
    fn test_char_slice_cjk() {
        let doc = "第一條 規定如下";
        assert_eq!(char_slice(doc, 4, 6), Some("規定"));
        assert_eq!(char_slice(doc, 0, 3), Some("第一條"));
        assert_eq!(char_slice(doc, 6, 99), None);
        assert_eq!(char_slice(doc, 5, 4), None);
    }

    #[test]
    fn test_byte_char_round_trip() {
        let doc = "a第b一c";
        for (byte_idx, _) in doc.char_indices() {
            let c = byte_to_char(doc, byte_idx);
            assert_eq!(char_to_byte(doc, c), Some(byte_idx));
        }
        assert_eq!(char_to_byte(doc, char_len(doc)), Some(doc.len()));
    }

    // --- similarity ---

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Hello,   World! "), "hello world");
        assert_eq!(normalize("第一條：規定"), "第一條規定");
        assert_eq!(normalize("a_b-c"), "a_bc");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn test_text_similarity_identical() {
        assert_eq!(text_similarity("same text", "same text"), 1.0);
    }

    #[test]
    fn test_text_similarity_normalized() {
        assert_eq!(text_similarity("Hello, World", "hello   world!"), 0.95);
    }

    #[test]
    fn test_text_similarity_token_jaccard() {
        // tokens: {quick, brown, fox} vs {quick, brown, dog} -> 2/4
        let sim = text_similarity("quick brown fox", "quick brown dog");
        assert!((sim - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_text_similarity_no_overlap() {
        assert_eq!(text_similarity("abc def", "ghi jkl"), 0.0);
    }

    #[test]
    fn test_length_similarity() {
        assert_eq!(length_similarity("abcd", "ab"), 0.5);
        assert_eq!(length_similarity("", ""), 1.0);
        assert_eq!(length_similarity("規定", "規定如下"), 0.5);
    }

    #[test]
    fn test_position_similarity() {
        assert_eq!(position_similarity(100, 100), 1.0);
        // within the 1000-char floor
        assert!((position_similarity(600, 100) - 0.5).abs() < 1e-9);
        // far beyond tolerance
        assert_eq!(position_similarity(5000, 100), 0.0);
        // tolerance grows at 10% of the original offset
        assert!((position_similarity(21_000, 20_000) - 0.5).abs() < 1e-9);
    }

    // --- context match ---

    #[test]
    fn test_context_search_exact_selected_text() {
        let doc = "0123456789第一條 規定如下：任何人不得擅自進入";
        let pos = position(14, 16, "規定", "第一條 ", "如下：");
        let range = context_search(doc, &pos).unwrap();
        assert_eq!(range.start_offset, 14);
        assert_eq!(range.end_offset, 16);
        assert_eq!(range.text, "規定");
        assert_eq!(range.confidence, Some(0.95));
    }

    #[test]
    fn test_context_search_window_fallback() {
        // the selected text between the contexts was rewritten
        let doc = "intro BEFORE something new AFTER outro";
        let pos = position(6, 14, "original", "BEFORE ", " AFTER");
        let range = context_search(doc, &pos).unwrap();
        assert_eq!(range.confidence, Some(0.7));
        assert_eq!(range.text, "something new");
        assert_eq!(range.start_offset, 13);
    }

    #[test]
    fn test_context_search_picks_closest_of_repeats() {
        // the same context pair occurs twice; the gap nearer the original
        // offset and more similar to the stored text must win
        let doc = "<p>provided that</p> filler <p>the term applies</p>";
        let pos = position(31, 47, "the term applies", "<p>", "</p>");
        let range = context_search(doc, &pos).unwrap();
        assert_eq!(range.text, "the term applies");
        assert_eq!(range.confidence, Some(0.95));
        assert_eq!(range.start_offset, 31);
    }

    #[test]
    fn test_context_search_no_context_stored() {
        let pos = position(0, 4, "text", "", "");
        assert!(context_search("some text here", &pos).is_none());
    }

    #[test]
    fn test_context_search_gap_limit() {
        // contexts present but separated by far more than 200 chars
        let filler = "x".repeat(500);
        let doc = format!("BEFORE {filler} AFTER");
        let pos = position(7, 11, "text", "BEFORE ", " AFTER");
        assert!(context_search(&doc, &pos).is_none());
    }

    // --- fingerprint match ---

    #[test]
    fn test_fingerprint_search_relocated_text() {
        let selected = "any person shall not enter the premises without prior written consent";
        // shift the text by a whole number of scan steps so one window
        // lands exactly on it
        let step = (char_len(selected) / 4).max(1);
        let prefix = "x".repeat(step * 2);
        let doc = format!("{prefix}{selected} trailing clauses follow here.");
        let pos = position(0, char_len(selected), selected, "", "");
        let range = fingerprint_search(&doc, &pos).unwrap();
        assert_eq!(range.start_offset, step * 2);
        assert_eq!(range.text, selected);
        assert_eq!(range.confidence, Some(1.0));
    }

    #[test]
    fn test_fingerprint_search_short_tokens_cannot_gate() {
        // every token ≤ 2 chars: no shingles, uninformative digest
        let pos = position(0, 2, "規定", "如 下", "不 得");
        assert!(fingerprint_search("完全無關的文字內容在此", &pos).is_none());
    }

    #[test]
    fn test_fingerprint_search_rejects_unrelated_document() {
        let selected = "statutory provisions apply throughout the entire territory";
        let pos = position(0, char_len(selected), selected, "chapter one begins ", " and so on");
        let doc = "completely different subject matter with no shared vocabulary at all";
        assert!(fingerprint_search(doc, &pos).is_none());
    }

    // --- fuzzy match ---

    #[test]
    fn test_fuzzy_search_whitespace_drift() {
        let doc = "intro text; the  quick\n brown   fox ends here";
        let pos = position(0, 19, "the quick brown fox", "", "");
        let range = fuzzy_search(doc, &pos).unwrap().unwrap();
        let found = char_slice(doc, range.start_offset, range.end_offset).unwrap();
        assert_eq!(normalize(found), "the quick brown fox");
        // normalized-identical, so similarity lands at 0.95
        assert_eq!(range.confidence, Some(0.95));
    }

    #[test]
    fn test_fuzzy_search_case_insensitive() {
        let doc = "Header. THE QUICK BROWN FOX. Footer.";
        let pos = position(0, 19, "the quick brown fox", "", "");
        let range = fuzzy_search(doc, &pos).unwrap().unwrap();
        assert_eq!(range.text, "THE QUICK BROWN FOX");
    }

    #[test]
    fn test_fuzzy_fallback_normalized_substring() {
        // punctuation inserted inside the word defeats the word-gap regex;
        // the normalized fallback still lands, at fixed 0.8
        let doc = "prefix 規定*如下 suffix";
        let pos = position(0, 4, "規定如下", "", "");
        let range = fuzzy_search(doc, &pos).unwrap().unwrap();
        assert_eq!(range.confidence, Some(0.8));
        assert_eq!(range.start_offset, 7);
        assert_eq!(range.end_offset, 12);
        assert_eq!(range.text, "規定*如下");
    }

    #[test]
    fn test_fuzzy_search_miss_is_ok_none() {
        let doc = "nothing in here lines up";
        let pos = position(0, 8, "absent phrase entirely", "", "");
        assert!(fuzzy_search(doc, &pos).unwrap().is_none());
    }

    #[test]
    fn test_normalized_substring_offset_map() {
        let doc = "  A,  B  c d ";
        // normalized doc: "a b c d"
        let range = normalized_substring_search(doc, "B C").unwrap();
        let found = char_slice(doc, range.start_offset, range.end_offset).unwrap();
        assert_eq!(found, "B  c");
    }
}
