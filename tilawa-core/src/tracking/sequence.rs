//! `SequenceAnalyzer`: flags skipped ayat, wrong-page recitation and
//! backward jumps from one tracker outcome and the anchor before it.
//!
//! At most one `SequenceError` per fragment, checked in priority order
//! page_mismatch, skip_aya, backwards_anomaly.

use tracing::debug;

use crate::config::AlignmentConfig;
use crate::corpus::{AyaRef, PageText};
use crate::ipc::{AyaRange, FragmentOutcome, SequenceError, SequenceErrorType, Severity};

use super::TrackerOutcome;

/// Skipping this many ayat or more is reported as high severity.
const HIGH_SEVERITY_SKIPPED_AYAS: usize = 3;

#[derive(Debug, Clone)]
pub struct SequenceAnalyzer {
    skip_min_words: usize,
    skip_min_ayas: usize,
    backward_margin: usize,
    alert_min_confidence: f32,
}

impl SequenceAnalyzer {
    pub fn new(config: &AlignmentConfig) -> Self {
        Self {
            skip_min_words: config.skip_min_words,
            skip_min_ayas: config.skip_min_ayas,
            backward_margin: config.backward_margin,
            alert_min_confidence: config.alert_min_confidence,
        }
    }

    pub fn analyze(
        &self,
        prev_anchor: usize,
        outcome: &TrackerOutcome,
        page: &PageText,
    ) -> Option<SequenceError> {
        if outcome.outcome == FragmentOutcome::NoConfidentSegment && !outcome.page_has_candidate {
            return Some(SequenceError {
                error_type: SequenceErrorType::PageMismatch,
                severity: Severity::High,
                affected_aya_range: None,
                confidence: outcome.confidence,
            });
        }

        let min_idx = outcome.min_correct?;
        let confidence = outcome.confidence;

        if min_idx >= prev_anchor && min_idx - prev_anchor >= self.skip_min_words {
            // Only ayat the reciter left behind count; the one `min_idx`
            // lands in is still being recited.
            let skipped = page.distinct_ayas(prev_anchor..page.aya_start(min_idx));
            if skipped >= self.skip_min_ayas {
                if confidence < self.alert_min_confidence {
                    debug!(
                        prev_anchor,
                        min_idx, confidence, "skip signal below confidence floor, suppressed"
                    );
                    return None;
                }
                let severity = if skipped >= HIGH_SEVERITY_SKIPPED_AYAS {
                    Severity::High
                } else {
                    Severity::Medium
                };
                return Some(SequenceError {
                    error_type: SequenceErrorType::SkipAya,
                    severity,
                    affected_aya_range: aya_range(page, prev_anchor, min_idx),
                    confidence,
                });
            }
        }

        if min_idx.saturating_add(self.backward_margin) < prev_anchor {
            if confidence < self.alert_min_confidence {
                debug!(
                    prev_anchor,
                    min_idx, confidence, "backwards signal below confidence floor, suppressed"
                );
                return None;
            }
            return Some(SequenceError {
                error_type: SequenceErrorType::BackwardsAnomaly,
                severity: Severity::Low,
                affected_aya_range: aya_range(page, min_idx, prev_anchor),
                confidence,
            });
        }

        None
    }
}

/// Ayat from the word at `from` up to, not including, the aya of the word at `to`.
fn aya_range(page: &PageText, from: usize, to: usize) -> Option<AyaRange> {
    Some(AyaRange {
        start: aya_at(page, from)?,
        end: aya_at(page, to)?,
    })
}

/// Aya of the word at or after `global`; past the end of the page, the
/// last word's aya.
fn aya_at(page: &PageText, global: usize) -> Option<AyaRef> {
    page.word_at_or_after(global)
        .or_else(|| page.words().last())
        .map(|w| w.aya_ref())
}
