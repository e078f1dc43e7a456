//! Annotation positioning
//!
//! Turns a fragile absolute-offset text selection into a resilient,
//! multi-signal locator and resolves that locator against later snapshots
//! of the document.
//!
//! # Overview
//!
//! A user highlight is captured as a [`SelectionData`] (absolute offsets
//! plus surrounding context). [`PositionService::calculate_position`]
//! converts it into an [`AnnotationPosition`] carrying four redundant
//! signals:
//!
//! - `primary`: the absolute offsets and exact text
//! - `context`: truncated before/after context plus an identity hash
//! - `structural`: a coarse bucket-based structural address
//! - `fingerprint`: a word-trigram content fingerprint
//!
//! When the annotation is displayed against a possibly-edited document,
//! [`PositionService::find_annotation_position`] runs a fixed cascade of
//! strategies over those signals and returns a [`PositioningResult`] with
//! the re-anchored span and a confidence score. A span that cannot be
//! recovered is reported as data (`success: false`), never as an error.
//!
//! # Usage
//!
//! ```
//! use marginalia::position::{PositionService, SelectionData};
//!
//! let service = PositionService::new();
//! let selection = SelectionData {
//!     selected_text: "quick brown fox".to_string(),
//!     start_offset: 4,
//!     end_offset: 19,
//!     context_before: "The ".to_string(),
//!     context_after: " jumps over".to_string(),
//!     element_path: None,
//!     source_url: None,
//! };
//! let position = service.calculate_position("doc-1", &selection);
//!
//! let document = "The quick brown fox jumps over the lazy dog";
//! let result = service.find_annotation_position(document, &position);
//! assert!(result.success);
//! ```

mod context;
mod error;
mod matching;
mod service;
mod structural;
mod types;

// Re-export the data model
pub use types::{
    AnnotationMatch, AnnotationPosition, ContextInfo, PositionMetadata, PositioningMethod,
    PositioningResult, PrimaryPosition, ResolutionMetadata, SelectionData, StructuralPath,
    TextRange,
};

// Re-export the error taxonomy
pub use error::PositionError;

// Re-export the analyzers and matching strategies
pub use context::{analyze_context, capture_context, HASHED_WINDOW, STORED_WINDOW};
pub use matching::{
    context_search, fingerprint_search, fuzzy_search, length_similarity, normalize,
    position_similarity, text_similarity,
};
pub use structural::{
    analyze_structure, find_by_structural_path, NoIndex, StructuralIndex, ARTICLE_BUCKET_CHARS,
    CHAPTER_BUCKET_CHARS, PARAGRAPH_BUCKET_CHARS,
};

// Re-export the orchestrator
pub use service::{PositionService, DEFAULT_MIN_CONFIDENCE};
