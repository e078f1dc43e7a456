//! Content hashing and trigram fingerprinting
//!
//! Cheap, deterministic content-identity checks used by the positioning
//! cascade. The hash is a 32-bit polynomial rolling hash rendered in
//! base 36: fast and stable across runs, but not cryptographic. The
//! fingerprint hashes the word-trigram shingles of a text, which makes it
//! insensitive to where the text sits in the document.

use std::collections::HashSet;

/// Minimum token length (in chars) for a token to participate in shingling.
/// Shorter tokens (articles, particles, bare CJK bigrams) carry too little
/// identity to be worth a shingle slot.
const MIN_TOKEN_LEN: usize = 3;

/// Tokens per shingle.
const SHINGLE_SIZE: usize = 3;

/// Deterministic polynomial rolling hash of `text`, as a base-36 string.
///
/// `h = (h << 5) - h + code` over the Unicode scalar values, wrapping at
/// 32 bits. Order-sensitive and total: `hash("")` is `"0"`.
pub fn hash(text: &str) -> String {
    let mut h: i32 = 0;
    for ch in text.chars() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(ch as i32);
    }
    to_base36(h.unsigned_abs())
}

/// Word 3-gram shingles of `text`.
///
/// Splits on whitespace, drops tokens shorter than 3 chars, and slides a
/// window of 3 consecutive tokens. Fewer than 3 surviving tokens yields an
/// empty shingle list.
pub fn shingles(text: &str) -> Vec<String> {
    let tokens: Vec<&str> = text
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .collect();

    tokens
        .windows(SHINGLE_SIZE)
        .map(|w| w.join(" "))
        .collect()
}

/// Shingles of `text` as a set, for Jaccard comparison.
pub fn shingle_set(text: &str) -> HashSet<String> {
    shingles(text).into_iter().collect()
}

/// Position-independent content fingerprint: the hash of the `|`-joined
/// shingle list. Texts with fewer than 3 long-enough tokens all collapse to
/// the empty-shingle fingerprint, which is stable but carries no identity.
pub fn fingerprint(text: &str) -> String {
    hash(&shingles(text).join("|"))
}

/// Jaccard similarity of two shingle sets. 0.0 when the union is empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn to_base36(mut n: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while n > 0 {
        buf.push(DIGITS[(n % 36) as usize] as char);
        n /= 36;
    }
    buf.iter().rev().collect()
}
