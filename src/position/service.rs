//! Position service
//!
//! The orchestrator: builds an [`AnnotationPosition`] locator when an
//! annotation is created, and later resolves it against a possibly-mutated
//! document by running a fixed cascade of strategies, cheapest and most
//! reliable first:
//!
//! 1. primary-offset recheck
//! 2. context match
//! 3. fingerprint match
//! 4. structural-path match (skipped without structural signal)
//! 5. fuzzy match
//!
//! The cascade is sequential on purpose (later strategies only run when
//! the earlier ones fail) and short-circuits on the first candidate that
//! reaches the caller's confidence threshold. Resolution never returns an
//! error for a failed search; the outcome is always a [`PositioningResult`].
//!
//! Each call is pure and stateless over its inputs, so callers may resolve
//! many annotations concurrently with one service instance.

use std::time::Instant;

use chrono::Utc;

use crate::fingerprint;

use super::context;
use super::matching::{self, char_len, char_slice};
use super::structural::{self, NoIndex, StructuralIndex};
use super::types::{
    AnnotationMatch, AnnotationPosition, PositionMetadata, PositioningMethod, PositioningResult,
    PrimaryPosition, ResolutionMetadata, SelectionData, TextRange,
};

/// Threshold below which a resolution does not short-circuit the cascade.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// A valid candidate below the caller's threshold is still returned as a
/// success if it reaches this floor.
const LOW_CONFIDENCE_FLOOR: f64 = 0.5;

/// The context term of the confidence blend is a fixed placeholder, not a
/// real context comparison. Kept for behavioral parity with the original
/// scoring.
const CONTEXT_TERM_PLACEHOLDER: f64 = 0.8;

/// Cascade order. Load-bearing: cost and reliability both increase down
/// the list.
const CASCADE: [PositioningMethod; 5] = [
    PositioningMethod::PrimaryPosition,
    PositioningMethod::ContextMatch,
    PositioningMethod::TextFingerprint,
    PositioningMethod::StructuralPath,
    PositioningMethod::FuzzyMatch,
];

/// Builds locators at annotation-creation time and resolves them at
/// read time. Holds only the structural-index collaborator; resolution
/// itself is stateless.
pub struct PositionService {
    index: Box<dyn StructuralIndex>,
}

impl Default for PositionService {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionService {
    /// Service without a structural index; chapter/article ids stay unknown.
    pub fn new() -> Self {
        Self {
            index: Box::new(NoIndex),
        }
    }

    pub fn with_index(index: impl StructuralIndex + 'static) -> Self {
        Self {
            index: Box::new(index),
        }
    }

    /// Build a locator from a captured selection. Never fails: every
    /// signal that cannot be derived is simply left weaker, and the
    /// creation-time confidence reflects the signal richness.
    pub fn calculate_position(
        &self,
        document_id: &str,
        selection: &SelectionData,
    ) -> AnnotationPosition {
        let context = context::capture_context(
            &selection.context_before,
            &selection.selected_text,
            &selection.context_after,
        );
        let structural = structural::analyze_structure(
            document_id,
            selection.start_offset,
            selection.end_offset,
            selection.element_path.as_deref(),
            &*self.index,
        );
        let fingerprint = fingerprint::fingerprint(&format!(
            "{}{}{}",
            selection.context_before, selection.selected_text, selection.context_after
        ));

        let text_length = char_len(&selection.selected_text);
        let confidence = creation_confidence(selection, text_length);

        tracing::debug!(
            document_id,
            start = selection.start_offset,
            end = selection.end_offset,
            confidence,
            "calculated annotation position"
        );

        AnnotationPosition {
            primary: PrimaryPosition {
                start_offset: selection.start_offset,
                end_offset: selection.end_offset,
                selected_text: selection.selected_text.clone(),
            },
            context,
            structural,
            fingerprint,
            metadata: PositionMetadata {
                created_at: Utc::now(),
                text_length,
                confidence,
            },
        }
    }

    /// Resolve a locator against a document snapshot with the default
    /// threshold of 0.7.
    pub fn find_annotation_position(
        &self,
        document_text: &str,
        position: &AnnotationPosition,
    ) -> PositioningResult {
        self.find_annotation_position_with_confidence(
            document_text,
            position,
            DEFAULT_MIN_CONFIDENCE,
        )
    }

    /// Resolve a locator against a document snapshot.
    ///
    /// Strategies run in cascade order; the first valid candidate whose
    /// rescored confidence reaches `min_confidence` wins immediately.
    /// Failing that, the best valid candidate at or above 0.5 is returned
    /// as a success, leaving accept/reject to the caller. Below that the
    /// annotation is unresolvable and `success` is `false`.
    pub fn find_annotation_position_with_confidence(
        &self,
        document_text: &str,
        position: &AnnotationPosition,
        min_confidence: f64,
    ) -> PositioningResult {
        let started = Instant::now();
        let mut strategies_used: Vec<PositioningMethod> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        let mut matches: Vec<AnnotationMatch> = Vec::new();

        tracing::debug!(
            document_chars = char_len(document_text),
            stored_start = position.primary.start_offset,
            stored_end = position.primary.end_offset,
            min_confidence,
            "resolving annotation position"
        );

        for method in CASCADE {
            if method == PositioningMethod::StructuralPath && !position.structural.is_searchable()
            {
                tracing::debug!("structural path strategy skipped: no structural signal");
                continue;
            }
            strategies_used.push(method);

            let outcome: Result<Option<TextRange>, String> = match method {
                PositioningMethod::PrimaryPosition => Ok(primary_check(document_text, position)),
                PositioningMethod::ContextMatch => {
                    Ok(matching::context_search(document_text, position))
                }
                PositioningMethod::TextFingerprint => {
                    Ok(matching::fingerprint_search(document_text, position))
                }
                PositioningMethod::StructuralPath => {
                    Ok(structural::find_by_structural_path(document_text, position))
                }
                PositioningMethod::FuzzyMatch => matching::fuzzy_search(document_text, position),
            };

            let range = match outcome {
                Ok(Some(range)) => range,
                Ok(None) => {
                    errors.push(format!("{method}: {}", miss_reason(method)));
                    continue;
                }
                Err(reason) => {
                    errors.push(format!("{method}: {reason}"));
                    continue;
                }
            };

            // A byte-identical primary hit is the one case that bypasses
            // rescoring: the document did not move under the locator.
            if method == PositioningMethod::PrimaryPosition && range.confidence == Some(1.0) {
                matches.push(AnnotationMatch {
                    range: range.clone(),
                    confidence: 1.0,
                    method,
                    metadata: None,
                });
                tracing::debug!("primary offsets still exact");
                return success(position, &range, 1.0, matches, errors, strategies_used, started);
            }

            if let Err(reason) = validate_position(&range, &position.primary.selected_text) {
                tracing::debug!(%method, reason, "candidate rejected by validation");
                errors.push(format!("{method}: {reason}"));
                continue;
            }

            let confidence = score_candidate(position, &range);
            tracing::debug!(%method, confidence, start = range.start_offset, "valid candidate");
            let range = range.with_confidence(confidence);
            matches.push(AnnotationMatch {
                range: range.clone(),
                confidence,
                method,
                metadata: None,
            });

            if confidence >= min_confidence {
                return success(
                    position,
                    &range,
                    confidence,
                    matches,
                    errors,
                    strategies_used,
                    started,
                );
            }
        }

        // No candidate reached the threshold; fall back to the best valid
        // one if it clears the floor. Ties keep the earlier strategy.
        let mut best: Option<AnnotationMatch> = None;
        for m in &matches {
            if best.as_ref().map_or(true, |b| m.confidence > b.confidence) {
                best = Some(m.clone());
            }
        }

        if let Some(best) = best {
            if best.confidence >= LOW_CONFIDENCE_FLOOR {
                tracing::debug!(
                    confidence = best.confidence,
                    method = %best.method,
                    "accepting best candidate below threshold"
                );
                let confidence = best.confidence;
                let range = best.range.clone();
                return success(
                    position,
                    &range,
                    confidence,
                    matches,
                    errors,
                    strategies_used,
                    started,
                );
            }
        }

        tracing::debug!(
            attempts = strategies_used.len(),
            "annotation position unresolvable"
        );
        PositioningResult {
            success: false,
            position: None,
            matches,
            errors,
            metadata: ResolutionMetadata {
                total_attempts: strategies_used.len(),
                strategies_used,
                processing_time_ms: elapsed_ms(started),
                confidence: 0.0,
            },
        }
    }
}

/// Recheck the stored offsets against the current document text.
///
/// Byte-identical text resolves at 1.0; text that only survives
/// normalization resolves at 0.9 and is rescored like any other candidate.
/// Malformed or stale offsets are a plain miss, never an error.
fn primary_check(document: &str, position: &AnnotationPosition) -> Option<TextRange> {
    let primary = &position.primary;
    if primary.start_offset >= primary.end_offset {
        return None;
    }
    let slice = char_slice(document, primary.start_offset, primary.end_offset)?;

    if slice == primary.selected_text {
        return Some(
            TextRange::new(primary.start_offset, primary.end_offset, slice).with_confidence(1.0),
        );
    }
    if matching::normalize(slice) == matching::normalize(&primary.selected_text) {
        return Some(
            TextRange::new(primary.start_offset, primary.end_offset, slice).with_confidence(0.9),
        );
    }
    None
}

/// Candidate sanity gate: non-empty, length within 2x either way, and at
/// least loosely similar to the original text.
fn validate_position(range: &TextRange, original: &str) -> Result<(), String> {
    if range.text.is_empty() {
        return Err("candidate text is empty".to_string());
    }
    let original_len = char_len(original);
    if original_len == 0 {
        return Err("original selected text is empty".to_string());
    }
    let ratio = char_len(&range.text) as f64 / original_len as f64;
    if !(0.5..=2.0).contains(&ratio) {
        return Err(format!("length ratio {ratio:.2} outside [0.5, 2.0]"));
    }
    let similarity = matching::text_similarity(&range.text, original);
    if similarity < 0.6 {
        return Err(format!("similarity {similarity:.2} below 0.6"));
    }
    Ok(())
}

/// Weighted confidence blend over a validated candidate.
fn score_candidate(position: &AnnotationPosition, range: &TextRange) -> f64 {
    let original = &position.primary.selected_text;
    let text = matching::text_similarity(&range.text, original);
    let accuracy = position_accuracy(range, &position.primary);
    let length = matching::length_similarity(&range.text, original);
    0.4 * text + 0.3 * accuracy + 0.2 * length + 0.1 * CONTEXT_TERM_PLACEHOLDER
}

/// Average of start/end offset accuracy; tolerance is 10% of the original
/// span length, floored at 10 chars.
fn position_accuracy(range: &TextRange, primary: &PrimaryPosition) -> f64 {
    let span = primary.end_offset.saturating_sub(primary.start_offset) as f64;
    let scale = (span * 0.1).max(10.0);
    let accuracy = |diff: usize| (1.0 - diff as f64 / scale).max(0.0);
    (accuracy(range.start_offset.abs_diff(primary.start_offset))
        + accuracy(range.end_offset.abs_diff(primary.end_offset)))
        / 2.0
}

fn creation_confidence(selection: &SelectionData, text_length: usize) -> f64 {
    let mut confidence: f64 = 0.5;
    if text_length > 10 {
        confidence += 0.1;
    }
    if text_length > 50 {
        confidence += 0.1;
    }
    if char_len(&selection.context_before) > 20 {
        confidence += 0.1;
    }
    if char_len(&selection.context_after) > 20 {
        confidence += 0.1;
    }
    if selection.element_path.is_some() {
        confidence += 0.2;
    }
    confidence.min(1.0)
}

fn miss_reason(method: PositioningMethod) -> &'static str {
    match method {
        PositioningMethod::PrimaryPosition => "text at stored offsets no longer matches",
        PositioningMethod::ContextMatch => "stored context not found within the gap limit",
        PositioningMethod::TextFingerprint => "no window passed the fingerprint gate",
        PositioningMethod::StructuralPath => "stored text absent near the structural address",
        PositioningMethod::FuzzyMatch => "no sufficiently similar text found",
    }
}

fn success(
    position: &AnnotationPosition,
    range: &TextRange,
    confidence: f64,
    matches: Vec<AnnotationMatch>,
    errors: Vec<String>,
    strategies_used: Vec<PositioningMethod>,
    started: Instant,
) -> PositioningResult {
    let mut updated = position.clone();
    updated.primary = PrimaryPosition {
        start_offset: range.start_offset,
        end_offset: range.end_offset,
        selected_text: range.text.clone(),
    };
    PositioningResult {
        success: true,
        position: Some(updated),
        matches,
        errors,
        metadata: ResolutionMetadata {
            total_attempts: strategies_used.len(),
            strategies_used,
            processing_time_ms: elapsed_ms(started),
            confidence,
        },
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
