//! Sliding-window catalogue of candidate segments over one page.

use std::sync::Arc;

use tracing::debug;

use crate::config::AlignmentConfig;
use crate::corpus::{CanonicalWord, PageText};

/// A contiguous run of canonical words considered as one match unit.
#[derive(Debug, Clone)]
pub struct SegmentCandidate {
    offset: usize,
    len: usize,
    pub start_global_index: usize,
    /// Global index of the last word (inclusive).
    pub end_global_index: usize,
    /// Normalized words joined by single spaces.
    pub concatenated_normalized_text: String,
    chars: Box<[char]>,
}

impl SegmentCandidate {
    /// Position of the first word inside the page.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of words in the segment.
    pub fn word_count(&self) -> usize {
        self.len
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }
}

/// Immutable candidate catalogue, built once per page and shared read-only.
///
/// Candidates are ordered by start position, then by length.
#[derive(Debug)]
pub struct SegmentIndex {
    words: Arc<[CanonicalWord]>,
    candidates: Vec<SegmentCandidate>,
    min_len: usize,
    max_len: usize,
}

impl SegmentIndex {
    /// For every start advancing by `SEGMENT_STRIDE`, emit one candidate of
    /// every length in `[MIN_SEGMENT_WORDS, MAX_SEGMENT_WORDS]` that fits.
    pub fn build(page: &PageText, config: &AlignmentConfig) -> Self {
        let words = page.shared_words();
        let n = words.len();
        let stride = config.segment_stride.max(1);
        let min_len = config.min_segment_words.max(1);
        let max_len = config.max_segment_words.max(min_len);

        let mut candidates = Vec::new();
        for offset in (0..n).step_by(stride) {
            for len in min_len..=max_len {
                if offset + len > n {
                    break;
                }
                candidates.push(window(&words, offset, len));
            }
        }

        debug!(
            page = page.page_no(),
            words = n,
            candidates = candidates.len(),
            "segment index built"
        );

        Self {
            words,
            candidates,
            min_len,
            max_len,
        }
    }

    pub fn candidates(&self) -> &[SegmentCandidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates whose start global index lies in `[lo, hi]`.
    pub fn scope(&self, lo: usize, hi: usize) -> &[SegmentCandidate] {
        let start = self
            .candidates
            .partition_point(|c| c.start_global_index < lo);
        let end = self
            .candidates
            .partition_point(|c| c.start_global_index <= hi);
        &self.candidates[start..end.max(start)]
    }

    pub fn words_of(&self, candidate: &SegmentCandidate) -> &[CanonicalWord] {
        &self.words[candidate.offset..candidate.offset + candidate.len]
    }

    /// Every window of `[MIN_SEGMENT_WORDS, MAX_SEGMENT_WORDS]` words starting
    /// exactly at the first page word at or after `global`.
    ///
    /// The stride grid only starts a window every `SEGMENT_STRIDE` words, so
    /// a fragment that begins between two grid points has no exact
    /// candidate there. Built on demand, never stored.
    pub fn windows_at(&self, global: usize) -> Vec<SegmentCandidate> {
        let offset = self.words.partition_point(|w| w.global_index < global);
        let n = self.words.len();
        (self.min_len..=self.max_len)
            .take_while(|len| offset + len <= n)
            .map(|len| window(&self.words, offset, len))
            .collect()
    }
}

fn window(words: &[CanonicalWord], offset: usize, len: usize) -> SegmentCandidate {
    let slice = &words[offset..offset + len];
    let text = slice
        .iter()
        .map(|w| w.normalized_text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    SegmentCandidate {
        offset,
        len,
        start_global_index: slice[0].global_index,
        end_global_index: slice[len - 1].global_index,
        chars: text.chars().collect(),
        concatenated_normalized_text: text,
    }
}
