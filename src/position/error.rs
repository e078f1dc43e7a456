//! Positioning error taxonomy
//!
//! The resolution cascade never returns `Err` for a failed search; failure
//! is data in the [`PositioningResult`]. These variants reify the documented
//! failure categories for callers that want a typed error at their own
//! boundary (an HTTP layer mapping orphaned annotations to a status code,
//! for instance).

use thiserror::Error;

use super::types::{PositioningMethod, PositioningResult};

/// How close two candidate confidences must be to count as an ambiguous tie.
const AMBIGUITY_MARGIN: f64 = 0.05;

/// Failure categories of a resolution attempt.
#[derive(Debug, Clone, Error)]
pub enum PositionError {
    /// Every strategy was exhausted without a valid candidate
    #[error("Text not found: no strategy produced a valid candidate ({attempted} attempted)")]
    TextNotFound { attempted: usize },

    /// A valid candidate exists but below the caller's threshold
    #[error("Low confidence match: best candidate scored {confidence:.2}, wanted {min_confidence:.2}")]
    LowConfidence { confidence: f64, min_confidence: f64 },

    /// Several candidates scored within a hair of each other and none
    /// reached the threshold
    #[error("Ambiguous match: {candidates} candidates within 0.05 of the best score")]
    AmbiguousMatch { candidates: usize },

    /// A strategy failed to execute (e.g. pattern compilation)
    #[error("Strategy {method} failed: {reason}")]
    StrategyFailed {
        method: PositioningMethod,
        reason: String,
    },
}

impl PositioningResult {
    /// Map this result onto the error taxonomy, for callers that treat an
    /// unanchored or weakly-anchored annotation as an error condition.
    ///
    /// Returns `None` when the result met the caller's threshold.
    pub fn as_error(&self, min_confidence: f64) -> Option<PositionError> {
        if self.success && self.metadata.confidence >= min_confidence {
            return None;
        }

        if !self.success {
            return Some(PositionError::TextNotFound {
                attempted: self.metadata.total_attempts,
            });
        }

        // Succeeded below threshold: ambiguous if several candidates
        // crowded the top score, otherwise plain low confidence.
        let best = self.metadata.confidence;
        let near_best = self
            .matches
            .iter()
            .filter(|m| best - m.confidence <= AMBIGUITY_MARGIN)
            .count();
        if near_best >= 2 {
            Some(PositionError::AmbiguousMatch {
                candidates: near_best,
            })
        } else {
            Some(PositionError::LowConfidence {
                confidence: best,
                min_confidence,
            })
        }
    }
}
