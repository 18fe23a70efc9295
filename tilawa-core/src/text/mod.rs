//! Text canonicalisation and edit distance.
//!
//! Both canonical words (at load time) and every incoming transcript
//! fragment pass through [`normalize`] so comparisons happen on the same
//! orthography.

pub mod distance;
pub mod normalize;

pub use distance::{levenshtein, similarity};
pub use normalize::{normalize, tokenize};

/// A transcript string for one processing call.
///
/// Owned by the call and dropped once the fragment has been aligned.
#[derive(Debug, Clone)]
pub struct TranscriptFragment {
    /// Text exactly as the transcriber produced it.
    pub raw: String,
    /// Normalized text; tokens joined by single spaces.
    pub normalized: String,
    /// Normalized word tokens.
    pub tokens: Vec<String>,
}

impl TranscriptFragment {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        let tokens = tokenize(&normalized);
        Self {
            raw,
            normalized,
            tokens,
        }
    }

    /// Returns true if nothing survived normalization.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
