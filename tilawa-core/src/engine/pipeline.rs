//! Per-fragment pipeline: evaluation, diagnostics and the per-session
//! asynchronous queue.
//!
//! ## Stages (per fragment)
//!
//! ```text
//! 1. Normalize raw text → TranscriptFragment
//! 2. PositionTracker::evaluate against a state snapshot   (pure)
//! 3. SequenceAnalyzer::analyze with the snapshot's anchor (pure)
//! 4. Commit anchor + mode under the session lock
//! 5. Broadcast RecitationEvent::Report
//! ```
//!
//! Queued fragments run stages 2–3 on `spawn_blocking` under the configured
//! deadline. A late result, or one whose snapshot no longer matches the
//! session's revision, is dropped and the session state stays as it was.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info_span, Instrument};

use crate::{
    error::{Result, TilawaError},
    ipc::{FragmentOutcome, SequenceError},
    session::{Session, SessionId},
    text::TranscriptFragment,
    tracking::{PageContext, PositionTracker, SequenceAnalyzer, SessionState, TrackerOutcome},
};

use super::RecitationEngine;

#[derive(Default)]
pub struct EngineDiagnostics {
    pub fragments_in: AtomicUsize,
    pub aligned: AtomicUsize,
    pub empty: AtomicUsize,
    pub no_confident_segment: AtomicUsize,
    pub dropped: AtomicUsize,
    pub alerts_emitted: AtomicUsize,
    pub search_mode_entries: AtomicUsize,
    processed: AtomicUsize,
    processing_micros: AtomicU64,
}

impl EngineDiagnostics {
    pub fn reset(&self) {
        self.fragments_in.store(0, Ordering::Relaxed);
        self.aligned.store(0, Ordering::Relaxed);
        self.empty.store(0, Ordering::Relaxed);
        self.no_confident_segment.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.alerts_emitted.store(0, Ordering::Relaxed);
        self.search_mode_entries.store(0, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.processing_micros.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, outcome: FragmentOutcome) {
        let counter = match outcome {
            FragmentOutcome::Aligned => &self.aligned,
            FragmentOutcome::Empty => &self.empty,
            FragmentOutcome::NoConfidentSegment => &self.no_confident_segment,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_elapsed(&self, elapsed: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.processing_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let processed = self.processed.load(Ordering::Relaxed);
        let micros = self.processing_micros.load(Ordering::Relaxed);
        DiagnosticsSnapshot {
            fragments_in: self.fragments_in.load(Ordering::Relaxed),
            aligned: self.aligned.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            no_confident_segment: self.no_confident_segment.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            alerts_emitted: self.alerts_emitted.load(Ordering::Relaxed),
            search_mode_entries: self.search_mode_entries.load(Ordering::Relaxed),
            mean_processing_micros: if processed == 0 {
                0
            } else {
                micros / processed as u64
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub fragments_in: usize,
    pub aligned: usize,
    pub empty: usize,
    pub no_confident_segment: usize,
    pub dropped: usize,
    pub alerts_emitted: usize,
    pub search_mode_entries: usize,
    pub mean_processing_micros: u64,
}

/// Tracker outcome plus the analyzer's verdict, ready to commit.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub outcome: TrackerOutcome,
    pub sequence_error: Option<SequenceError>,
}

/// Stages 2–3. Pure: reads the state, never writes it.
pub fn evaluate(
    tracker: &PositionTracker,
    analyzer: &SequenceAnalyzer,
    state: &SessionState,
    page: &PageContext,
    fragment: &TranscriptFragment,
) -> Evaluation {
    let outcome = tracker.evaluate(state, page, fragment);
    let sequence_error = match outcome.outcome {
        FragmentOutcome::Empty => None,
        _ => analyzer.analyze(state.anchor_global_index, &outcome, &page.page),
    };
    Evaluation {
        outcome,
        sequence_error,
    }
}

#[derive(Debug)]
pub(crate) struct QueuedFragment {
    pub seq: u64,
    pub text: String,
}

/// Sending side of a session's FIFO fragment queue.
///
/// Fragments are evaluated strictly in push order, one at a time. Results
/// arrive on `RecitationEngine::subscribe`. Dropping every clone of the
/// queue stops its worker once the backlog drains.
#[derive(Debug, Clone)]
pub struct FragmentQueue {
    session: Arc<Session>,
    tx: mpsc::UnboundedSender<QueuedFragment>,
}

impl FragmentQueue {
    pub fn session_id(&self) -> SessionId {
        self.session.id()
    }

    /// Enqueue one transcript fragment; returns its sequence number.
    pub fn push(&self, text: impl Into<String>) -> Result<u64> {
        if self.session.is_closed() {
            return Err(TilawaError::SessionClosed(self.session.id()));
        }
        let seq = self.session.next_seq();
        self.tx
            .send(QueuedFragment {
                seq,
                text: text.into(),
            })
            .map_err(|_| TilawaError::SessionClosed(self.session.id()))?;
        Ok(seq)
    }
}

pub(crate) fn spawn(engine: Arc<RecitationEngine>, session: Arc<Session>) -> FragmentQueue {
    let (tx, rx) = mpsc::unbounded_channel();
    let queue = FragmentQueue {
        session: Arc::clone(&session),
        tx,
    };
    tokio::spawn(run(engine, session, rx));
    queue
}

async fn run(
    engine: Arc<RecitationEngine>,
    session: Arc<Session>,
    mut rx: mpsc::UnboundedReceiver<QueuedFragment>,
) {
    let id = session.id();
    debug!(session = %id, "fragment queue started");
    while let Some(item) = rx.recv().await {
        if session.is_closed() {
            break;
        }
        let span = info_span!("fragment", session = %id, seq = item.seq);
        engine
            .process_queued(&session, item)
            .instrument(span)
            .await;
    }
    debug!(session = %id, "fragment queue stopped");
}
