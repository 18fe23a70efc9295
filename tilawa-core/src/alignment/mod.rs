//! Fragment-to-text matching.
//!
//! ```text
//! PageText ──build once──► SegmentIndex (overlapping windows, cached text)
//!                               │ scope (tracking window | full page)
//! TranscriptFragment ──► SegmentScorer::best ──► winning segment
//!                               │
//!                         WordAligner::align ──► per-word pairs
//! ```
//!
//! Scorer and aligner are stateless; they only read the immutable index and
//! configuration, so they are safe to run on any worker thread.

pub mod aligner;
pub mod scorer;
pub mod segment;

pub use aligner::{AlignedPair, Alignment, WordAligner};
pub use scorer::{ScoredSegment, SegmentScorer};
pub use segment::{SegmentCandidate, SegmentIndex};
