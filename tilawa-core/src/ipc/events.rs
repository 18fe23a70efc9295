//! Per-fragment output records and engine events.
//!
//! | Record | Produced by |
//! |--------|-------------|
//! | `AlignmentMatch` | `PositionTracker` (one per aligned word) |
//! | `SequenceError` | `SequenceAnalyzer` (zero or one per fragment) |
//! | `FragmentReport` | `RecitationEngine` (one per processed fragment) |
//! | `RecitationEvent` | engine broadcast channel |

use serde::{Deserialize, Serialize};

use crate::corpus::AyaRef;
use crate::session::SessionId;
use crate::tracking::TrackingMode;

// ---------------------------------------------------------------------------
// Word matches
// ---------------------------------------------------------------------------

/// Outcome of one column of the word alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    /// Spoken word matches the canonical word.
    Correct,
    /// Spoken word aligned to a canonical word but too dissimilar.
    Incorrect,
    /// Spoken word with no canonical counterpart.
    Extra,
    /// Canonical word not recited yet (a gap, not an error).
    Pending,
}

/// One transcript token mapped to a canonical word, or a gap on either side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentMatch {
    /// `None` for extra spoken words.
    pub aya_id: Option<u32>,
    pub word_index_in_aya: Option<u16>,
    pub global_index: Option<usize>,
    pub is_correct: bool,
    /// Word similarity in [0, 1]; 0 for gaps.
    pub score: f32,
    pub status: MatchStatus,
    pub spoken_word: Option<String>,
    pub expected_word: Option<String>,
}

// ---------------------------------------------------------------------------
// Sequence anomalies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceErrorType {
    SkipAya,
    PageMismatch,
    BackwardsAnomaly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Half-open range of ayat: `start` is affected, `end` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AyaRange {
    pub start: AyaRef,
    pub end: AyaRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceError {
    pub error_type: SequenceErrorType,
    pub severity: Severity,
    pub affected_aya_range: Option<AyaRange>,
    pub confidence: f32,
}

// ---------------------------------------------------------------------------
// Fragment reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentOutcome {
    /// A segment cleared the threshold and the words were aligned.
    Aligned,
    /// No candidate in scope cleared `SEGMENT_SCORE_THRESHOLD`.
    NoConfidentSegment,
    /// Nothing survived normalization.
    Empty,
}

/// Everything the engine reports for one processed fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentReport {
    /// Per-session fragment sequence number, starting at 1.
    pub seq: u64,
    pub session_id: SessionId,
    pub outcome: FragmentOutcome,
    pub matches: Vec<AlignmentMatch>,
    pub sequence_error: Option<SequenceError>,
    pub confidence: f32,
    /// Score of the winning segment, if any.
    pub segment_score: Option<f32>,
    /// Mode after this fragment committed.
    pub mode: TrackingMode,
    /// Anchor after this fragment committed.
    pub anchor: usize,
    pub consecutive_low_confidence: u32,
}

impl FragmentReport {
    pub fn correct_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.matches
            .iter()
            .filter(|m| m.is_correct)
            .filter_map(|m| m.global_index)
    }
}

/// Broadcast to every `RecitationEngine::subscribe` receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecitationEvent {
    Report(FragmentReport),
    /// A queued fragment missed its deadline or went stale; session state
    /// was left unchanged.
    #[serde(rename_all = "camelCase")]
    Dropped {
        session_id: SessionId,
        seq: u64,
        reason: String,
    },
}
