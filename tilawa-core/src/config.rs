//! Alignment and tracking configuration.
//!
//! One immutable `AlignmentConfig` is constructed at startup, validated, and
//! shared by reference (or `Arc`) with the segment index, scorer, aligner,
//! tracker and analyzer. Field names serialise in SCREAMING_SNAKE_CASE so a
//! settings file can use the same knob names as the documentation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TilawaError};

/// How per-word scores are folded into one fragment-level confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceAggregation {
    /// Mean similarity of the CORRECT-marked words.
    #[default]
    MeanCorrect,
    /// Sum of CORRECT similarities divided by the number of spoken tokens,
    /// so extraneous or unmatched speech lowers the confidence.
    SpokenCoverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(default)]
pub struct AlignmentConfig {
    /// Minimum per-word similarity for an aligned pair to count as correct.
    pub word_similarity_threshold: f32,
    /// Minimum segment score for a candidate to be considered at all.
    pub segment_score_threshold: f32,
    /// α: weight of the normalized edit-distance similarity.
    pub levenshtein_weight: f32,
    /// β: weight of the length-difference penalty.
    pub length_penalty_weight: f32,
    /// Words ahead of the anchor searched in tracking mode.
    pub tracking_window_size: usize,
    /// Words behind the anchor searched in tracking mode; also the slack
    /// before a match is treated as a backwards jump.
    pub backward_margin: usize,
    pub min_segment_words: usize,
    pub max_segment_words: usize,
    pub segment_stride: usize,
    /// Fragments below this confidence count towards the search-mode switch.
    pub confidence_threshold: f32,
    pub max_low_confidence_chunks: u32,
    pub skip_min_words: usize,
    pub skip_min_ayas: usize,
    /// Skip/backwards signals below this fragment confidence are suppressed.
    pub alert_min_confidence: f32,
    /// Penalty for an extraneous spoken word.
    pub delete_cost: f32,
    /// Penalty for a canonical word skipped inside the chosen segment.
    pub insert_cost: f32,
    pub confidence_aggregation: ConfidenceAggregation,
    /// Fragments queued through the async pipeline that are not scored and
    /// aligned within this budget are dropped.
    pub fragment_deadline_ms: u64,
}

impl AlignmentConfig {
    pub const DEFAULT_FRAGMENT_DEADLINE_MS: u64 = 2_000;

    /// Check cross-field consistency. Called once by the engine constructor.
    pub fn validate(&self) -> Result<()> {
        fn unit(name: &str, value: f32) -> Result<()> {
            if !(0.0..=1.0).contains(&value) {
                return Err(TilawaError::InvalidConfig(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
            Ok(())
        }

        unit("WORD_SIMILARITY_THRESHOLD", self.word_similarity_threshold)?;
        unit("SEGMENT_SCORE_THRESHOLD", self.segment_score_threshold)?;
        unit("LEVENSHTEIN_WEIGHT", self.levenshtein_weight)?;
        unit("LENGTH_PENALTY_WEIGHT", self.length_penalty_weight)?;
        unit("CONFIDENCE_THRESHOLD", self.confidence_threshold)?;
        unit("ALERT_MIN_CONFIDENCE", self.alert_min_confidence)?;

        let weight_sum = self.levenshtein_weight + self.length_penalty_weight;
        if (weight_sum - 1.0).abs() > 1e-4 {
            return Err(TilawaError::InvalidConfig(format!(
                "LEVENSHTEIN_WEIGHT + LENGTH_PENALTY_WEIGHT must equal 1, got {weight_sum}"
            )));
        }
        if self.min_segment_words == 0 {
            return Err(TilawaError::InvalidConfig(
                "MIN_SEGMENT_WORDS must be at least 1".into(),
            ));
        }
        if self.min_segment_words > self.max_segment_words {
            return Err(TilawaError::InvalidConfig(format!(
                "MIN_SEGMENT_WORDS ({}) exceeds MAX_SEGMENT_WORDS ({})",
                self.min_segment_words, self.max_segment_words
            )));
        }
        if self.segment_stride == 0 {
            return Err(TilawaError::InvalidConfig(
                "SEGMENT_STRIDE must be at least 1".into(),
            ));
        }
        if self.max_low_confidence_chunks == 0 {
            return Err(TilawaError::InvalidConfig(
                "MAX_LOW_CONFIDENCE_CHUNKS must be at least 1".into(),
            ));
        }
        if !(self.delete_cost >= 0.0 && self.insert_cost >= 0.0) {
            return Err(TilawaError::InvalidConfig(
                "DELETE_COST and INSERT_COST must be non-negative".into(),
            ));
        }
        if self.fragment_deadline_ms == 0 {
            return Err(TilawaError::InvalidConfig(
                "FRAGMENT_DEADLINE_MS must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn fragment_deadline(&self) -> Duration {
        Duration::from_millis(self.fragment_deadline_ms)
    }

    /// Apply `TILAWA_<KNOB>` environment overrides. Unparseable values are
    /// ignored with a warning; validation still happens in the engine.
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|key| std::env::var(format!("TILAWA_{key}")).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn set<T: std::str::FromStr>(
            slot: &mut T,
            key: &str,
            lookup: &impl Fn(&str) -> Option<String>,
        ) {
            let Some(raw) = lookup(key) else {
                return;
            };
            match raw.trim().parse::<T>() {
                Ok(v) => *slot = v,
                Err(_) => warn!(key, value = %raw, "ignoring unparseable config override"),
            }
        }

        set(&mut self.word_similarity_threshold, "WORD_SIMILARITY_THRESHOLD", &lookup);
        set(&mut self.segment_score_threshold, "SEGMENT_SCORE_THRESHOLD", &lookup);
        set(&mut self.levenshtein_weight, "LEVENSHTEIN_WEIGHT", &lookup);
        set(&mut self.length_penalty_weight, "LENGTH_PENALTY_WEIGHT", &lookup);
        set(&mut self.tracking_window_size, "TRACKING_WINDOW_SIZE", &lookup);
        set(&mut self.backward_margin, "BACKWARD_MARGIN", &lookup);
        set(&mut self.min_segment_words, "MIN_SEGMENT_WORDS", &lookup);
        set(&mut self.max_segment_words, "MAX_SEGMENT_WORDS", &lookup);
        set(&mut self.segment_stride, "SEGMENT_STRIDE", &lookup);
        set(&mut self.confidence_threshold, "CONFIDENCE_THRESHOLD", &lookup);
        set(&mut self.max_low_confidence_chunks, "MAX_LOW_CONFIDENCE_CHUNKS", &lookup);
        set(&mut self.skip_min_words, "SKIP_MIN_WORDS", &lookup);
        set(&mut self.skip_min_ayas, "SKIP_MIN_AYAS", &lookup);
        set(&mut self.alert_min_confidence, "ALERT_MIN_CONFIDENCE", &lookup);
        set(&mut self.delete_cost, "DELETE_COST", &lookup);
        set(&mut self.insert_cost, "INSERT_COST", &lookup);
        set(&mut self.fragment_deadline_ms, "FRAGMENT_DEADLINE_MS", &lookup);

        if let Some(raw) = lookup("CONFIDENCE_AGGREGATION") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "mean_correct" | "mean" => {
                    self.confidence_aggregation = ConfidenceAggregation::MeanCorrect
                }
                "spoken_coverage" | "coverage" => {
                    self.confidence_aggregation = ConfidenceAggregation::SpokenCoverage
                }
                other => warn!(value = other, "ignoring unknown confidence aggregation"),
            }
        }
    }
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            word_similarity_threshold: 0.45,
            segment_score_threshold: 0.5,
            levenshtein_weight: 0.7,
            length_penalty_weight: 0.3,
            tracking_window_size: 40,
            backward_margin: 15,
            min_segment_words: 5,
            max_segment_words: 25,
            segment_stride: 3,
            confidence_threshold: 0.4,
            max_low_confidence_chunks: 3,
            skip_min_words: 12,
            skip_min_ayas: 1,
            alert_min_confidence: 0.5,
            delete_cost: 0.8,
            insert_cost: 0.8,
            confidence_aggregation: ConfidenceAggregation::MeanCorrect,
            fragment_deadline_ms: Self::DEFAULT_FRAGMENT_DEADLINE_MS,
        }
    }
}
