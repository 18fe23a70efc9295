//! Per-session reading position: state, the tracker state machine and the
//! sequence-anomaly analyzer.
//!
//! ## Flow per fragment
//!
//! ```text
//! SessionState (snapshot) ─► PositionTracker::evaluate ─► TrackerOutcome
//!                                                              │
//!                                      SequenceAnalyzer::analyze(prev_anchor)
//!                                                              │
//!                              SessionState::commit(outcome, sequence_error)
//! ```
//!
//! `evaluate` and `analyze` are pure; only `commit` mutates, and the engine
//! guarantees one committer per session at a time.

pub mod sequence;
pub mod tracker;

use serde::{Deserialize, Serialize};

use crate::alignment::SegmentIndex;
use crate::config::AlignmentConfig;
use crate::corpus::PageText;
use crate::ipc::{FragmentOutcome, SequenceError, SequenceErrorType};

pub use sequence::SequenceAnalyzer;
pub use tracker::{PositionTracker, TrackerOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// Scope limited to a window around the anchor.
    #[default]
    Tracking,
    /// Whole page in scope, after sustained low confidence.
    Search,
}

/// A page's words and its candidate catalogue. Built once per page and
/// shared read-only between sessions.
#[derive(Debug)]
pub struct PageContext {
    pub page: PageText,
    pub index: SegmentIndex,
}

impl PageContext {
    pub fn build(page: PageText, config: &AlignmentConfig) -> Self {
        let index = SegmentIndex::build(&page, config);
        Self { page, index }
    }
}

/// Mutable reading state of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Next expected word; starts at the page's first word.
    pub anchor_global_index: usize,
    pub mode: TrackingMode,
    pub consecutive_low_confidence_count: u32,
    pub current_page_id: u16,
    pub last_confidence: f32,
    /// Number of committed fragments since the session (or page) started.
    pub revision: u64,
}

impl SessionState {
    pub fn new(page: &PageText) -> Self {
        Self {
            anchor_global_index: page.first_global_index(),
            mode: TrackingMode::Tracking,
            consecutive_low_confidence_count: 0,
            current_page_id: page.page_no(),
            last_confidence: 0.0,
            revision: 0,
        }
    }

    /// Restart progress at the first word of `page`.
    pub fn reset_to_page(&mut self, page: &PageText) {
        let revision = self.revision + 1;
        *self = Self::new(page);
        self.revision = revision;
    }

    /// Fold one fragment confidence into the low-confidence streak and
    /// derive the mode from it. Returns true when this call entered search.
    pub fn record_confidence(&mut self, confidence: f32, config: &AlignmentConfig) -> bool {
        let before = self.mode;
        self.last_confidence = confidence;
        if confidence < config.confidence_threshold {
            self.consecutive_low_confidence_count =
                self.consecutive_low_confidence_count.saturating_add(1);
        } else {
            self.consecutive_low_confidence_count = 0;
        }
        self.mode = if self.consecutive_low_confidence_count >= config.max_low_confidence_chunks {
            TrackingMode::Search
        } else {
            TrackingMode::Tracking
        };
        before != TrackingMode::Search && self.mode == TrackingMode::Search
    }

    /// Apply an evaluated fragment. Empty fragments leave the state
    /// untouched. Returns true when the session entered search mode.
    pub fn commit(
        &mut self,
        outcome: &TrackerOutcome,
        sequence_error: Option<&SequenceError>,
        config: &AlignmentConfig,
    ) -> bool {
        if outcome.outcome == FragmentOutcome::Empty {
            return false;
        }

        let entered_search = self.record_confidence(outcome.confidence, config);
        if let Some(max_correct) = outcome.max_correct {
            let next = max_correct + 1;
            let backwards = sequence_error
                .is_some_and(|e| e.error_type == SequenceErrorType::BackwardsAnomaly);
            self.anchor_global_index = if backwards {
                next
            } else {
                self.anchor_global_index.max(next)
            };
        }
        self.revision += 1;
        entered_search
    }
}
