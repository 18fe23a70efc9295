//! Fuzzy scoring of a transcript fragment against candidate segments.
//!
//! ```text
//! score = α · (1 − Lev(T, Q) / max(|T|, |Q|)) − β · (| |T| − |Q| | / max(|T|, |Q|))
//! ```
//!
//! over normalized character sequences. An exact match scores α, the
//! maximum. Because `Lev(T, Q) ≥ | |T| − |Q| |`, the length difference alone
//! bounds the score from above, which lets the scan skip most edit-distance
//! computations.

use crate::config::AlignmentConfig;
use crate::text::levenshtein;

use super::segment::SegmentCandidate;

/// Scores closer than this are treated as tied.
const TIE_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct ScoredSegment<'a> {
    pub candidate: &'a SegmentCandidate,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct SegmentScorer {
    alpha: f32,
    beta: f32,
    threshold: f32,
}

impl SegmentScorer {
    pub fn new(config: &AlignmentConfig) -> Self {
        Self {
            alpha: config.levenshtein_weight,
            beta: config.length_penalty_weight,
            threshold: config.segment_score_threshold,
        }
    }

    pub fn score(&self, fragment: &[char], segment: &[char]) -> f32 {
        let max_len = fragment.len().max(segment.len());
        if max_len == 0 {
            return 0.0;
        }
        let max_len = max_len as f32;
        let distance = levenshtein(fragment, segment) as f32;
        let length_gap = fragment.len().abs_diff(segment.len()) as f32;
        self.alpha * (1.0 - distance / max_len) - self.beta * (length_gap / max_len)
    }

    /// Highest score any segment of this length could reach.
    fn upper_bound(&self, fragment_len: usize, segment_len: usize) -> f32 {
        let max_len = fragment_len.max(segment_len);
        if max_len == 0 {
            return 0.0;
        }
        let gap = fragment_len.abs_diff(segment_len) as f32 / max_len as f32;
        self.alpha * (1.0 - gap) - self.beta * gap
    }

    /// Best candidate scoring at least `SEGMENT_SCORE_THRESHOLD`, or `None`
    /// when nothing is confident enough.
    ///
    /// Ties go to the candidate whose start is closest to `anchor`, then to
    /// the earlier start, then to the shorter segment.
    pub fn best<'a>(
        &self,
        fragment: &[char],
        candidates: &'a [SegmentCandidate],
        anchor: usize,
    ) -> Option<ScoredSegment<'a>> {
        if fragment.is_empty() {
            return None;
        }

        let mut best: Option<ScoredSegment<'a>> = None;
        for candidate in candidates {
            let bound = self.upper_bound(fragment.len(), candidate.chars().len());
            if bound < self.threshold {
                continue;
            }
            if let Some(current) = &best {
                if bound < current.score - TIE_EPSILON {
                    continue;
                }
            }

            let score = self.score(fragment, candidate.chars());
            if score < self.threshold {
                continue;
            }
            let scored = ScoredSegment { candidate, score };
            best = match best {
                Some(current) if !prefer(&scored, &current, anchor) => Some(current),
                _ => Some(scored),
            };
        }
        best
    }
}

/// The better of two `best` results, under the same tie-break.
pub fn better<'a>(
    a: Option<ScoredSegment<'a>>,
    b: Option<ScoredSegment<'a>>,
    anchor: usize,
) -> Option<ScoredSegment<'a>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if prefer(&b, &a, anchor) { b } else { a }),
        (a, b) => a.or(b),
    }
}

/// Whether `a` beats `b`.
fn prefer(a: &ScoredSegment<'_>, b: &ScoredSegment<'_>, anchor: usize) -> bool {
    if (a.score - b.score).abs() > TIE_EPSILON {
        return a.score > b.score;
    }
    let key = |s: &ScoredSegment<'_>| {
        (
            s.candidate.start_global_index.abs_diff(anchor),
            s.candidate.start_global_index,
            s.candidate.word_count(),
        )
    };
    key(a) < key(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::segment::SegmentIndex;
    use crate::corpus::{fixtures, CanonicalWord, PageText};
    use approx::assert_abs_diff_eq;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn scorer() -> SegmentScorer {
        SegmentScorer::new(&AlignmentConfig::default())
    }

    #[test]
    fn exact_match_scores_alpha() {
        let text = chars("بسم الله الرحمن الرحيم");
        assert_abs_diff_eq!(scorer().score(&text, &text), 0.7, epsilon = 1e-6);
    }

    #[test]
    fn formula_matches_hand_computation() {
        // |T| = 4, |Q| = 6, Lev = 2 → 0.7·(1 − 2/6) − 0.3·(2/6)
        let score = scorer().score(&chars("abcd"), &chars("abcdef"));
        assert_abs_diff_eq!(score, 0.7 * (4.0 / 6.0) - 0.3 * (2.0 / 6.0), epsilon = 1e-6);
    }

    #[test]
    fn upper_bound_never_below_score() {
        let s = scorer();
        let pairs = [("abc", "xyzw"), ("الحمد لله", "الحمد"), ("a", "a"), ("abcdef", "fedcba")];
        for (a, b) in pairs {
            let (a, b) = (chars(a), chars(b));
            assert!(s.upper_bound(a.len(), b.len()) + 1e-6 >= s.score(&a, &b));
        }
    }

    #[test]
    fn picks_exact_segment_among_many() {
        let page = fixtures::page(0, 60, 6);
        let index = SegmentIndex::build(&page, &AlignmentConfig::default());
        let target = index
            .candidates()
            .iter()
            .find(|c| c.start_global_index == 21 && c.word_count() == 7)
            .expect("candidate exists");
        let fragment = target.chars().to_vec();

        let best = scorer()
            .best(&fragment, index.candidates(), 0)
            .expect("confident match");
        assert_eq!(best.candidate.start_global_index, 21);
        assert_eq!(best.candidate.word_count(), 7);
        assert_abs_diff_eq!(best.score, 0.7, epsilon = 1e-6);
    }

    #[test]
    fn no_confident_match_for_unrelated_text() {
        let page = fixtures::page(0, 30, 6);
        let index = SegmentIndex::build(&page, &AlignmentConfig::default());
        let fragment = chars("hello world this is not quranic text at all");
        assert!(scorer().best(&fragment, index.candidates(), 0).is_none());
        assert!(scorer().best(&[], index.candidates(), 0).is_none());
    }

    #[test]
    fn ties_break_towards_anchor() {
        // The same five words repeat three times on the page.
        let base = fixtures::page(0, 5, 5);
        let mut words: Vec<CanonicalWord> = Vec::new();
        for copy in 0..3 {
            for (i, w) in base.words().iter().enumerate() {
                let mut w = w.clone();
                w.global_index = copy * 5 + i;
                words.push(w);
            }
        }
        let page = PageText::new(1, words).expect("page");
        let config = AlignmentConfig {
            min_segment_words: 5,
            max_segment_words: 5,
            segment_stride: 5,
            ..AlignmentConfig::default()
        };
        let index = SegmentIndex::build(&page, &config);
        let fragment = index.candidates()[0].chars().to_vec();

        let s = SegmentScorer::new(&config);
        let near_end = s.best(&fragment, index.candidates(), 11).expect("match");
        assert_eq!(near_end.candidate.start_global_index, 10);
        let near_start = s.best(&fragment, index.candidates(), 1).expect("match");
        assert_eq!(near_start.candidate.start_global_index, 0);
        let middle = s.best(&fragment, index.candidates(), 6).expect("match");
        assert_eq!(middle.candidate.start_global_index, 5);
    }
}
