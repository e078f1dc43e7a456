//! Context analysis
//!
//! Captures the text surrounding a selection as a re-anchoring signal.
//! 100-char windows on each side feed the identity hash; only the innermost
//! 50 chars of each window are stored for display and pattern search. The
//! asymmetry matters: the hash is a stronger identity check than the
//! stored slices and must not weaken when the stored context is truncated.

use crate::fingerprint;

use super::matching::{char_len, char_slice};
use super::types::ContextInfo;

/// Chars per side covered by the identity hash.
pub const HASHED_WINDOW: usize = 100;

/// Chars per side actually stored on the locator.
pub const STORED_WINDOW: usize = 50;

/// Analyze the context around `[start, end)` in `document`.
///
/// Offsets are character offsets and are clamped to the document bounds.
pub fn analyze_context(document: &str, start: usize, end: usize) -> ContextInfo {
    let len = char_len(document);
    let start = start.min(len);
    let end = end.min(len).max(start);

    let full_before = char_slice(document, start.saturating_sub(HASHED_WINDOW), start)
        .unwrap_or_default();
    let full_after = char_slice(document, end, (end + HASHED_WINDOW).min(len)).unwrap_or_default();
    let selected = char_slice(document, start, end).unwrap_or_default();

    build(full_before, selected, full_after)
}

/// Analyze context from the raw strings captured at selection time, for
/// callers that do not have the document at hand (locator creation happens
/// on the capture path). The captured context may be arbitrarily long; only
/// the 100 chars nearest the selection count.
pub fn capture_context(before: &str, selected: &str, after: &str) -> ContextInfo {
    build(tail(before, HASHED_WINDOW), selected, head(after, HASHED_WINDOW))
}

fn build(full_before: &str, selected: &str, full_after: &str) -> ContextInfo {
    ContextInfo {
        before: tail(full_before, STORED_WINDOW).to_string(),
        after: head(full_after, STORED_WINDOW).to_string(),
        hash: fingerprint::hash(&format!("{full_before}{selected}{full_after}")),
    }
}

/// Last `n` chars of `s`.
fn tail(s: &str, n: usize) -> &str {
    let len = char_len(s);
    char_slice(s, len.saturating_sub(n), len).unwrap_or(s)
}

/// First `n` chars of `s`.
fn head(s: &str, n: usize) -> &str {
    char_slice(s, 0, n.min(char_len(s))).unwrap_or(s)
}
