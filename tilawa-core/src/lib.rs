//! # tilawa-core
//!
//! Recitation tracking engine: follows a reciter through the canonical
//! Quran text from a noisy live transcript, word by word, and flags skipped
//! ayat, wrong-page recitation and backward jumps.
//!
//! ## Architecture
//!
//! ```text
//! Transcriber ─► TranscriptFragment (normalize)
//!                      │
//!        PositionTracker: scope by mode ─► SegmentScorer over SegmentIndex
//!                      │                          │
//!                      │                  WordAligner on the winner
//!                      ▼
//!              SequenceAnalyzer(prev anchor) ─► commit anchor + mode
//!                      │
//!        broadcast::Sender<RecitationEvent> / FragmentReport
//! ```
//!
//! Scoring and alignment are pure and run off the session lock; each session
//! commits its fragments strictly in arrival order.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod alignment;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod session;
pub mod text;
pub mod tracking;
pub mod transcribe;

// Convenience re-exports for downstream crates
pub use config::{AlignmentConfig, ConfidenceAggregation};
pub use corpus::{CanonicalWord, CorpusMetadata, PageText, QuranText};
pub use engine::{DiagnosticsSnapshot, FragmentQueue, RecitationEngine};
pub use error::{Result, TilawaError};
pub use ipc::{
    AlignmentMatch, AyaRange, FragmentOutcome, FragmentReport, MatchStatus, RecitationEvent,
    SequenceError, SequenceErrorType, Severity,
};
pub use session::SessionId;
pub use tracking::{SessionState, TrackingMode};
pub use transcribe::{PassthroughTranscriber, Transcriber, TranscriberHandle};
