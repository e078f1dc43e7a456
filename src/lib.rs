//! Marginalia
//!
//! A text re-anchoring engine for document annotations. When a user
//! highlights a span and the underlying document is later re-extracted,
//! re-formatted, or edited, the stored character offsets go stale; this
//! crate recovers the span the user actually meant, with a quantified
//! confidence, by storing multiple redundant locator signals at creation
//! time and resolving them through a cascade of matching strategies.
//!
//! # Modules
//!
//! - `position`: the locator data model, analyzers, matching strategies,
//!   and the orchestrating [`position::PositionService`]
//! - `fingerprint`: content hashing and word-trigram fingerprinting
//!
//! The crate is pure, synchronous computation over in-memory strings: no
//! I/O, no shared state. HTTP framing, persistence, and document
//! extraction belong to the surrounding application.

pub mod fingerprint;
pub mod position;
