//! `PositionTracker`: scope selection, segment scoring and word alignment for
//! one fragment against a session's current position.

use tracing::debug;

use crate::alignment::{
    scorer, Alignment, SegmentCandidate, SegmentIndex, SegmentScorer, WordAligner,
};
use crate::config::{AlignmentConfig, ConfidenceAggregation};
use crate::corpus::CanonicalWord;
use crate::ipc::{AlignmentMatch, FragmentOutcome, MatchStatus};
use crate::text::TranscriptFragment;

use super::{PageContext, SessionState, TrackingMode};

/// Result of evaluating one fragment. Nothing here has been committed.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerOutcome {
    pub outcome: FragmentOutcome,
    pub matches: Vec<AlignmentMatch>,
    pub confidence: f32,
    pub segment_score: Option<f32>,
    /// Whether any candidate on the whole page clears the segment threshold.
    pub page_has_candidate: bool,
    /// Smallest global index among CORRECT matches.
    pub min_correct: Option<usize>,
    /// Largest global index among CORRECT matches.
    pub max_correct: Option<usize>,
}

impl TrackerOutcome {
    pub fn empty() -> Self {
        Self {
            outcome: FragmentOutcome::Empty,
            matches: Vec::new(),
            confidence: 0.0,
            segment_score: None,
            page_has_candidate: true,
            min_correct: None,
            max_correct: None,
        }
    }

    fn no_confident_segment(page_has_candidate: bool) -> Self {
        Self {
            outcome: FragmentOutcome::NoConfidentSegment,
            page_has_candidate,
            ..Self::empty()
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionTracker {
    config: AlignmentConfig,
    scorer: SegmentScorer,
    aligner: WordAligner,
}

impl PositionTracker {
    pub fn new(config: &AlignmentConfig) -> Self {
        Self {
            config: config.clone(),
            scorer: SegmentScorer::new(config),
            aligner: WordAligner::new(config),
        }
    }

    /// Candidates searched for `state`: a window around the anchor while
    /// tracking, the whole page while searching.
    pub fn scope<'a>(&self, state: &SessionState, index: &'a SegmentIndex) -> &'a [SegmentCandidate] {
        match state.mode {
            TrackingMode::Search => index.candidates(),
            TrackingMode::Tracking => {
                let anchor = state.anchor_global_index;
                index.scope(
                    anchor.saturating_sub(self.config.backward_margin),
                    anchor.saturating_add(self.config.tracking_window_size),
                )
            }
        }
    }

    pub fn evaluate(
        &self,
        state: &SessionState,
        ctx: &PageContext,
        fragment: &TranscriptFragment,
    ) -> TrackerOutcome {
        if fragment.is_empty() {
            return TrackerOutcome::empty();
        }

        let chars: Vec<char> = fragment.normalized.chars().collect();
        let anchor = state.anchor_global_index;
        let scope = self.scope(state, &ctx.index);

        // Fragments rarely start on the stride grid; while tracking, also
        // try windows that begin exactly at the anchor.
        let anchored = match state.mode {
            TrackingMode::Tracking => ctx.index.windows_at(anchor),
            TrackingMode::Search => Vec::new(),
        };
        let best = scorer::better(
            self.scorer.best(&chars, scope, anchor),
            self.scorer.best(&chars, &anchored, anchor),
            anchor,
        );

        let Some(best) = best else {
            // Whole-page pass so the analyzer can tell "elsewhere on this
            // page" from "not on this page at all".
            let page_has_candidate = scope.len() < ctx.index.len()
                && self
                    .scorer
                    .best(&chars, ctx.index.candidates(), anchor)
                    .is_some();
            debug!(
                anchor,
                mode = ?state.mode,
                scoped = scope.len(),
                page_has_candidate,
                "no confident segment"
            );
            return TrackerOutcome::no_confident_segment(page_has_candidate);
        };

        let canonical = ctx.index.words_of(best.candidate);
        let alignment = self.aligner.align(&fragment.tokens, canonical);
        let matches = build_matches(&alignment, &fragment.tokens, canonical, anchor);
        let confidence = self.confidence(&alignment, fragment.tokens.len());

        let correct = alignment
            .correct()
            .filter_map(|p| p.canonical)
            .map(|j| canonical[j].global_index);
        let (min_correct, max_correct) = correct.fold((None, None), |(lo, hi), g| {
            (
                Some(lo.map_or(g, |lo: usize| lo.min(g))),
                Some(hi.map_or(g, |hi: usize| hi.max(g))),
            )
        });

        debug!(
            anchor,
            segment_start = best.candidate.start_global_index,
            segment_words = best.candidate.word_count(),
            score = best.score,
            confidence,
            "fragment aligned"
        );

        TrackerOutcome {
            outcome: FragmentOutcome::Aligned,
            matches,
            confidence,
            segment_score: Some(best.score),
            page_has_candidate: true,
            min_correct,
            max_correct,
        }
    }

    fn confidence(&self, alignment: &Alignment, spoken_tokens: usize) -> f32 {
        let (sum, count) = alignment
            .correct()
            .fold((0.0f32, 0usize), |(sum, n), p| (sum + p.score, n + 1));
        let denominator = match self.config.confidence_aggregation {
            ConfidenceAggregation::MeanCorrect => count,
            ConfidenceAggregation::SpokenCoverage => spoken_tokens,
        };
        if denominator == 0 {
            0.0
        } else {
            sum / denominator as f32
        }
    }
}

/// Convert alignment columns into output records. Canonical gaps before the
/// anchor were recited earlier and are left out.
fn build_matches(
    alignment: &Alignment,
    spoken: &[String],
    canonical: &[CanonicalWord],
    anchor: usize,
) -> Vec<AlignmentMatch> {
    alignment
        .pairs
        .iter()
        .filter_map(|pair| {
            let word = pair.canonical.map(|j| &canonical[j]);
            if pair.status == MatchStatus::Pending
                && word.is_some_and(|w| w.global_index < anchor)
            {
                return None;
            }
            Some(AlignmentMatch {
                aya_id: word.map(|w| w.aya_id),
                word_index_in_aya: word.map(|w| w.word_index_in_aya),
                global_index: word.map(|w| w.global_index),
                is_correct: pair.status == MatchStatus::Correct,
                score: pair.score,
                status: pair.status,
                spoken_word: pair.spoken.map(|i| spoken[i].clone()),
                expected_word: word.map(|w| w.text.clone()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{fixtures, PageText};
    use approx::assert_abs_diff_eq;

    fn context(page: PageText) -> PageContext {
        PageContext::build(page, &AlignmentConfig::default())
    }

    fn recite(page: &PageText, from: usize, to: usize) -> TranscriptFragment {
        let first = page.first_global_index();
        let text = page.words()[from - first..to - first]
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        TranscriptFragment::new(text)
    }

    #[test]
    fn aligns_exact_fragment_in_tracking_window() {
        let ctx = context(fixtures::page(0, 60, 6));
        let tracker = PositionTracker::new(&AlignmentConfig::default());
        let mut state = SessionState::new(&ctx.page);
        state.anchor_global_index = 12;

        let outcome = tracker.evaluate(&state, &ctx, &recite(&ctx.page, 12, 18));
        assert_eq!(outcome.outcome, FragmentOutcome::Aligned);
        assert_eq!(outcome.matches.len(), 6);
        assert!(outcome.matches.iter().all(|m| m.is_correct));
        assert_eq!(outcome.min_correct, Some(12));
        assert_eq!(outcome.max_correct, Some(17));
        assert_abs_diff_eq!(outcome.confidence, 1.0);
        assert_abs_diff_eq!(outcome.segment_score.unwrap_or_default(), 0.7, epsilon = 1e-6);
        assert_eq!(outcome.matches[0].aya_id, Some(1003));
        assert_eq!(outcome.matches[0].word_index_in_aya, Some(0));
    }

    #[test]
    fn fragment_starting_between_grid_points_aligns_at_the_anchor() {
        let ctx = context(fixtures::page(0, 60, 6));
        let tracker = PositionTracker::new(&AlignmentConfig::default());
        let mut state = SessionState::new(&ctx.page);

        for start in [5, 8, 11] {
            state.anchor_global_index = start;
            let outcome = tracker.evaluate(&state, &ctx, &recite(&ctx.page, start, start + 5));
            assert_eq!(outcome.outcome, FragmentOutcome::Aligned, "start {start}");
            assert_eq!(outcome.min_correct, Some(start));
            assert_eq!(outcome.max_correct, Some(start + 4));
            assert_abs_diff_eq!(outcome.segment_score.unwrap_or_default(), 0.7, epsilon = 1e-6);
        }
    }

    #[test]
    fn tracking_window_excludes_distant_text_but_search_finds_it() {
        let ctx = context(fixtures::page(0, 120, 6));
        let tracker = PositionTracker::new(&AlignmentConfig::default());
        let mut state = SessionState::new(&ctx.page);
        let fragment = recite(&ctx.page, 81, 87);

        let outcome = tracker.evaluate(&state, &ctx, &fragment);
        assert_eq!(outcome.outcome, FragmentOutcome::NoConfidentSegment);
        assert!(outcome.page_has_candidate);
        assert!(outcome.matches.is_empty());

        state.mode = TrackingMode::Search;
        let outcome = tracker.evaluate(&state, &ctx, &fragment);
        assert_eq!(outcome.outcome, FragmentOutcome::Aligned);
        assert_eq!(outcome.min_correct, Some(81));
    }

    #[test]
    fn unrelated_text_has_no_page_candidate() {
        let ctx = context(fixtures::page(0, 120, 6));
        let tracker = PositionTracker::new(&AlignmentConfig::default());
        let state = SessionState::new(&ctx.page);

        let outcome = tracker.evaluate(
            &state,
            &ctx,
            &TranscriptFragment::new("the quick brown fox jumps over the lazy dog"),
        );
        assert_eq!(outcome.outcome, FragmentOutcome::NoConfidentSegment);
        assert!(!outcome.page_has_candidate);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn empty_fragment_short_circuits() {
        let ctx = context(fixtures::page(0, 30, 6));
        let tracker = PositionTracker::new(&AlignmentConfig::default());
        let outcome = tracker.evaluate(
            &SessionState::new(&ctx.page),
            &ctx,
            &TranscriptFragment::new("، ؟ ..."),
        );
        assert_eq!(outcome, TrackerOutcome::empty());
    }

    #[test]
    fn already_recited_gap_is_not_reported() {
        let ctx = context(fixtures::page(0, 60, 6));
        let tracker = PositionTracker::new(&AlignmentConfig::default());
        let mut state = SessionState::new(&ctx.page);
        state.anchor_global_index = 10;
        state.mode = TrackingMode::Search;

        // searching uses only the stride grid: the best segment starts at
        // word 9, one word before the anchor
        let outcome = tracker.evaluate(&state, &ctx, &recite(&ctx.page, 10, 15));
        assert_eq!(outcome.outcome, FragmentOutcome::Aligned);
        assert_eq!(outcome.matches.len(), 5);
        assert!(outcome.matches.iter().all(|m| m.is_correct));
        assert!(outcome.matches.iter().all(|m| m.global_index != Some(9)));
        assert_eq!(outcome.max_correct, Some(14));
    }

    #[test]
    fn spoken_coverage_penalises_extra_speech() {
        let config = AlignmentConfig {
            confidence_aggregation: ConfidenceAggregation::SpokenCoverage,
            ..AlignmentConfig::default()
        };
        let ctx = PageContext::build(fixtures::page(0, 30, 6), &config);
        let tracker = PositionTracker::new(&config);
        let state = SessionState::new(&ctx.page);

        let mut text = recite(&ctx.page, 0, 10).raw;
        text.push_str(" qqqq");
        let outcome = tracker.evaluate(&state, &ctx, &TranscriptFragment::new(text));
        assert_eq!(outcome.outcome, FragmentOutcome::Aligned);
        assert_abs_diff_eq!(outcome.confidence, 10.0 / 11.0, epsilon = 1e-5);
        let noise = outcome
            .matches
            .iter()
            .find(|m| m.spoken_word.as_deref() == Some("qqqq"))
            .expect("noise token is on the path");
        assert!(!noise.is_correct);
        assert_ne!(noise.status, MatchStatus::Correct);
    }

    #[test]
    fn three_unrelated_fragments_switch_to_search() {
        let config = AlignmentConfig::default();
        let ctx = context(fixtures::page(0, 60, 6));
        let tracker = PositionTracker::new(&config);
        let mut state = SessionState::new(&ctx.page);
        let noise = TranscriptFragment::new("lorem ipsum dolor sit amet consectetur");

        let mut modes = Vec::new();
        for _ in 0..3 {
            let outcome = tracker.evaluate(&state, &ctx, &noise);
            state.commit(&outcome, None, &config);
            modes.push(state.mode);
        }
        assert_eq!(
            modes,
            vec![TrackingMode::Tracking, TrackingMode::Tracking, TrackingMode::Search]
        );
        assert_eq!(state.anchor_global_index, 0);
    }
}
