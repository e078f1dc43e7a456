//! Positioning data model
//!
//! A persisted annotation carries an [`AnnotationPosition`] locator: the
//! best-known absolute offsets plus redundant context, structural, and
//! fingerprint signals so the span can be re-found after the document text
//! drifts. Resolution produces a [`PositioningResult`], never an error;
//! failure to re-anchor is an expected outcome, encoded as data.
//!
//! All offsets are character offsets (Unicode scalar values), not bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw text selection captured by the client at annotation-creation time.
///
/// Immutable input to the position service. Offsets are absolute character
/// offsets into the document text as the client saw it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionData {
    /// The exact text the user selected
    pub selected_text: String,
    /// Start character offset (inclusive)
    pub start_offset: usize,
    /// End character offset (exclusive)
    pub end_offset: usize,
    /// Raw text preceding the selection, arbitrary length
    #[serde(default)]
    pub context_before: String,
    /// Raw text following the selection, arbitrary length
    #[serde(default)]
    pub context_after: String,
    /// Coarse structural address of the selection, if the client had one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_path: Option<String>,
    /// Source document URL, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

/// Best-known absolute location of the annotated span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryPosition {
    /// Start character offset (inclusive)
    pub start_offset: usize,
    /// End character offset (exclusive)
    pub end_offset: usize,
    /// The selected text at those offsets
    pub selected_text: String,
}

/// Truncated surrounding context plus a content-identity hash.
///
/// `before`/`after` store at most 50 chars each; `hash` covers the full
/// 100-char windows around the selection. The stored slices are for display
/// and pattern search, the hash is the stronger identity check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextInfo {
    /// Up to 50 chars immediately preceding the selection
    pub before: String,
    /// Up to 50 chars immediately following the selection
    pub after: String,
    /// Hash over the untruncated windows + selected text
    pub hash: String,
}

/// Coarse structural address of the span. All fields are optional; the
/// analyzer fills in whatever it can derive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralPath {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    /// Approximate paragraph index (fixed-size character buckets)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_path: Option<String>,
}

impl StructuralPath {
    /// Whether the path carries any signal usable for structural lookup.
    pub fn is_searchable(&self) -> bool {
        self.paragraph_index.is_some() || self.element_path.is_some()
    }
}

/// Creation-time metadata for a locator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionMetadata {
    /// When the locator was computed
    pub created_at: DateTime<Utc>,
    /// Character length of the selected text at creation time
    pub text_length: usize,
    /// Heuristic estimate of how well-anchored the locator is, from signal
    /// richness at creation time (not from any matching attempt)
    pub confidence: f64,
}

/// The persisted locator: a multi-signal address for a text span.
///
/// Created once from a [`SelectionData`], read whenever the annotation must
/// be displayed. Resolution may produce an updated copy with corrected
/// `primary` offsets; the other signals are carried forward unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPosition {
    pub primary: PrimaryPosition,
    pub context: ContextInfo,
    pub structural: StructuralPath,
    /// Hash over word-trigram shingles of the selection's neighborhood
    pub fingerprint: String,
    pub metadata: PositionMetadata,
}

impl AnnotationPosition {
    /// Creation-time invariant: offsets are a non-empty forward range and
    /// the stored text spans exactly that many characters. May legitimately
    /// fail after drift; that divergence is what resolution corrects.
    pub fn is_well_formed(&self) -> bool {
        self.primary.start_offset < self.primary.end_offset
            && self.primary.selected_text.chars().count()
                == self.primary.end_offset - self.primary.start_offset
    }
}

/// A located span in a specific document snapshot. Ephemeral: produced by
/// resolution, never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRange {
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl TextRange {
    pub fn new(start_offset: usize, end_offset: usize, text: impl Into<String>) -> Self {
        Self {
            start_offset,
            end_offset,
            text: text.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Which strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositioningMethod {
    PrimaryPosition,
    ContextMatch,
    TextFingerprint,
    StructuralPath,
    FuzzyMatch,
}

impl std::fmt::Display for PositioningMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PositioningMethod::PrimaryPosition => "primary_position",
            PositioningMethod::ContextMatch => "context_match",
            PositioningMethod::TextFingerprint => "text_fingerprint",
            PositioningMethod::StructuralPath => "structural_path",
            PositioningMethod::FuzzyMatch => "fuzzy_match",
        };
        f.write_str(name)
    }
}

/// A validated candidate produced by one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationMatch {
    pub range: TextRange,
    /// Rescored confidence in [0, 1]
    pub confidence: f64,
    pub method: PositioningMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Per-call diagnostics for a resolution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionMetadata {
    /// Strategies actually executed (skipped strategies are not counted)
    pub total_attempts: usize,
    /// Execution order of the attempted strategies
    pub strategies_used: Vec<PositioningMethod>,
    /// Wall-clock time of the resolution call, in milliseconds
    pub processing_time_ms: f64,
    /// Confidence of the accepted candidate, or 0.0 on failure
    pub confidence: f64,
}

/// Full outcome of a resolution attempt. Always returned: a span that
/// cannot be re-anchored yields `success: false`, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositioningResult {
    pub success: bool,
    /// On success, the input locator with `primary` corrected to the
    /// resolved span; other signals carried forward unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<AnnotationPosition>,
    /// Every valid candidate the cascade produced, in strategy order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<AnnotationMatch>,
    /// Per-strategy diagnostics, tagged with the strategy name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub metadata: ResolutionMetadata,
}

impl PositioningResult {
    /// The annotation could not be re-anchored at all; callers typically
    /// render it as orphaned.
    pub fn is_orphaned(&self) -> bool {
        !self.success
    }

    /// Highest-confidence valid candidate, if any. Ties keep the earlier
    /// (cheaper, more reliable) strategy.
    pub fn best_match(&self) -> Option<&AnnotationMatch> {
        let mut best: Option<&AnnotationMatch> = None;
        for m in &self.matches {
            match best {
                Some(b) if m.confidence <= b.confidence => {}
                _ => best = Some(m),
            }
        }
        best
    }

    /// Method of the accepted candidate, if the resolution succeeded.
    pub fn method(&self) -> Option<PositioningMethod> {
        if self.success {
            self.best_match().map(|m| m.method)
        } else {
            None
        }
    }
}
