//! Structural analysis
//!
//! Derives a coarse structural address for a span and locates a span by
//! such an address. The paragraph index is a fixed-size character bucket,
//! deliberately approximate, so it survives edits that would invalidate any
//! exact boundary detection. Chapter and article ids come from an external
//! structural index, treated as a black box that may answer "unknown".

use super::matching::{byte_to_char, char_len, char_slice};
use super::types::{AnnotationPosition, StructuralPath, TextRange};

/// One paragraph bucket per this many characters.
pub const PARAGRAPH_BUCKET_CHARS: usize = 300;

/// One chapter bucket per this many characters.
pub const CHAPTER_BUCKET_CHARS: usize = 5000;

/// One article bucket per this many characters.
pub const ARTICLE_BUCKET_CHARS: usize = 1000;

/// Chars searched before a paragraph bucket's estimated offset.
const PARAGRAPH_WINDOW_BEFORE: usize = 100;

/// Chars searched after a paragraph bucket's estimated offset.
const PARAGRAPH_WINDOW_AFTER: usize = 600;

/// External lookup for chapter/article identifiers, keyed by document id
/// and bucket. Implementations may always answer `None`.
pub trait StructuralIndex: Send + Sync {
    fn chapter_id(&self, document_id: &str, chapter_bucket: usize) -> Option<String>;
    fn article_id(&self, document_id: &str, article_bucket: usize) -> Option<String>;
}

/// Null index: every lookup answers "unknown".
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIndex;

impl StructuralIndex for NoIndex {
    fn chapter_id(&self, _document_id: &str, _chapter_bucket: usize) -> Option<String> {
        None
    }

    fn article_id(&self, _document_id: &str, _article_bucket: usize) -> Option<String> {
        None
    }
}

/// Derive the structural address of `[start, end)` in the given document.
pub fn analyze_structure(
    document_id: &str,
    start_offset: usize,
    _end_offset: usize,
    element_path: Option<&str>,
    index: &dyn StructuralIndex,
) -> StructuralPath {
    let chapter_id = index.chapter_id(document_id, start_offset / CHAPTER_BUCKET_CHARS);
    let article_id = index.article_id(document_id, start_offset / ARTICLE_BUCKET_CHARS);
    tracing::trace!(
        document_id,
        start_offset,
        chapter = chapter_id.as_deref().unwrap_or("unknown"),
        article = article_id.as_deref().unwrap_or("unknown"),
        "derived structural path"
    );

    StructuralPath {
        chapter_id,
        article_id,
        section_id: None,
        paragraph_index: Some(start_offset / PARAGRAPH_BUCKET_CHARS),
        element_path: element_path.map(str::to_string),
    }
}

/// Locate the stored text by its structural address.
///
/// With a paragraph index, only a window around the bucket's estimated
/// offset is searched (confidence 0.8). Without one, an element path
/// justifies a whole-document substring search (confidence 0.9).
pub fn find_by_structural_path(
    document: &str,
    position: &AnnotationPosition,
) -> Option<TextRange> {
    let selected = &position.primary.selected_text;
    if selected.is_empty() {
        return None;
    }

    if let Some(paragraph_index) = position.structural.paragraph_index {
        let estimated = paragraph_index * PARAGRAPH_BUCKET_CHARS;
        let len = char_len(document);
        let window_start = estimated.saturating_sub(PARAGRAPH_WINDOW_BEFORE);
        let window_end = (estimated + PARAGRAPH_WINDOW_AFTER).min(len);
        if window_start >= window_end {
            return None;
        }

        let window = char_slice(document, window_start, window_end)?;
        let byte_idx = window.find(selected.as_str())?;
        let start = window_start + byte_to_char(window, byte_idx);
        let end = start + char_len(selected);
        tracing::trace!(paragraph_index, start, "paragraph window hit");
        return Some(TextRange::new(start, end, selected.clone()).with_confidence(0.8));
    }

    if position.structural.element_path.is_some() {
        let byte_idx = document.find(selected.as_str())?;
        let start = byte_to_char(document, byte_idx);
        let end = start + char_len(selected);
        return Some(TextRange::new(start, end, selected.clone()).with_confidence(0.9));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::types::{ContextInfo, PositionMetadata, PrimaryPosition};
    use chrono::Utc;

    struct FixedIndex;

    impl StructuralIndex for FixedIndex {
        fn chapter_id(&self, _document_id: &str, chapter_bucket: usize) -> Option<String> {
            Some(format!("ch-{chapter_bucket}"))
        }

        fn article_id(&self, _document_id: &str, article_bucket: usize) -> Option<String> {
            (article_bucket < 3).then(|| format!("art-{article_bucket}"))
        }
    }

    fn position_with(structural: StructuralPath, selected: &str) -> AnnotationPosition {
        AnnotationPosition {
            primary: PrimaryPosition {
                start_offset: 0,
                end_offset: char_len(selected),
                selected_text: selected.to_string(),
            },
            context: ContextInfo {
                before: String::new(),
                after: String::new(),
                hash: "0".to_string(),
            },
            structural,
            fingerprint: "0".to_string(),
            metadata: PositionMetadata {
                created_at: Utc::now(),
                text_length: char_len(selected),
                confidence: 0.5,
            },
        }
    }

    #[test]
    fn test_bucket_arithmetic() {
        let path = analyze_structure("doc-1", 6200, 6210, None, &FixedIndex);
        assert_eq!(path.paragraph_index, Some(20)); // 6200 / 300
        assert_eq!(path.chapter_id.as_deref(), Some("ch-1")); // 6200 / 5000
        assert_eq!(path.article_id, None); // bucket 6 > known range
        assert_eq!(path.section_id, None);
    }

    #[test]
    fn test_analyze_with_null_index() {
        let path = analyze_structure("doc-1", 450, 460, Some("/article[2]/p[1]"), &NoIndex);
        assert_eq!(path.paragraph_index, Some(1));
        assert_eq!(path.chapter_id, None);
        assert_eq!(path.article_id, None);
        assert_eq!(path.element_path.as_deref(), Some("/article[2]/p[1]"));
    }

    #[test]
    fn test_paragraph_window_hit() {
        // place the text inside bucket 1's window (estimated offset 300)
        let mut doc = "x".repeat(320);
        doc.push_str("needle text");
        doc.push_str(&"y".repeat(200));
        let pos = position_with(
            StructuralPath {
                paragraph_index: Some(1),
                ..Default::default()
            },
            "needle text",
        );
        let range = find_by_structural_path(&doc, &pos).unwrap();
        assert_eq!(range.start_offset, 320);
        assert_eq!(range.confidence, Some(0.8));
    }

    #[test]
    fn test_paragraph_window_bounds() {
        // the text exists, but outside the bucket's window
        let mut doc = "x".repeat(1200);
        doc.push_str("needle text");
        let pos = position_with(
            StructuralPath {
                paragraph_index: Some(1),
                ..Default::default()
            },
            "needle text",
        );
        assert!(find_by_structural_path(&doc, &pos).is_none());
    }

    #[test]
    fn test_element_path_fallback_searches_whole_document() {
        let mut doc = "x".repeat(1200);
        doc.push_str("needle text");
        let pos = position_with(
            StructuralPath {
                element_path: Some("/p[3]".to_string()),
                ..Default::default()
            },
            "needle text",
        );
        let range = find_by_structural_path(&doc, &pos).unwrap();
        assert_eq!(range.start_offset, 1200);
        assert_eq!(range.confidence, Some(0.9));
    }

    #[test]
    fn test_paragraph_index_takes_precedence_over_element_path() {
        // with a paragraph index present, a miss in the window is final
        let mut doc = "x".repeat(1200);
        doc.push_str("needle text");
        let pos = position_with(
            StructuralPath {
                paragraph_index: Some(1),
                element_path: Some("/p[3]".to_string()),
                ..Default::default()
            },
            "needle text",
        );
        assert!(find_by_structural_path(&doc, &pos).is_none());
    }

    #[test]
    fn test_no_signal_yields_none() {
        let pos = position_with(StructuralPath::default(), "needle text");
        assert!(find_by_structural_path("needle text here", &pos).is_none());
    }
}
