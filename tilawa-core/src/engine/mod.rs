//! `RecitationEngine`: top-level owner of configuration, canonical text,
//! page contexts and sessions.
//!
//! ## Lifecycle
//!
//! ```text
//! RecitationEngine::new(config, quran)      → config validated
//!     └─► open_session(page)                → anchor at the page's first word
//!         ├─► process_fragment(id, text)    → FragmentReport (synchronous)
//!         ├─► spawn_queue(id).push(text)    → RecitationEvent::Report (async)
//!         ├─► change_page(id, page)         → progress reset
//!         └─► close_session(id)             → state discarded
//! ```
//!
//! ## Threading
//!
//! `RecitationEngine` is `Send + Sync`. Page contexts are built once on
//! first use and shared as `Arc<PageContext>` by every session on that page.
//! Per-session ordering comes from the session mutex (synchronous path) or
//! the session's FIFO queue (asynchronous path, which also needs the engine
//! in an `Arc` and a running Tokio runtime).

pub mod pipeline;

use std::collections::HashMap;
use std::sync::{atomic::Ordering, Arc};
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{error, info, info_span, warn};

use crate::{
    config::AlignmentConfig,
    corpus::QuranText,
    error::{Result, TilawaError},
    ipc::{FragmentReport, RecitationEvent},
    session::{Session, SessionId, SessionStore},
    text::TranscriptFragment,
    tracking::{PageContext, PositionTracker, SequenceAnalyzer, SessionState},
    transcribe::TranscriberHandle,
};

pub use pipeline::{DiagnosticsSnapshot, EngineDiagnostics, Evaluation, FragmentQueue};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Follows recitation sessions through the canonical text.
///
/// ```
/// use std::sync::Arc;
/// use tilawa_core::{AlignmentConfig, FragmentOutcome, QuranText, RecitationEngine};
///
/// let quran = QuranText::from_json_str(
///     r#"[{"id": 1, "jozz": 1, "page": 1, "sura_no": 1, "sura_name_ar": "الفاتحة",
///          "aya_no": 1, "aya_text_emlaey": "الحمد لله رب العالمين الرحمن الرحيم مالك يوم الدين"}]"#,
/// )?;
/// let engine = RecitationEngine::new(AlignmentConfig::default(), Arc::new(quran))?;
/// let session = engine.open_session(1)?;
///
/// let report = engine.process_fragment(session, "الحمد لله رب العالمين الرحمن الرحيم مالك يوم الدين")?;
/// assert_eq!(report.outcome, FragmentOutcome::Aligned);
/// assert_eq!(report.anchor, 8);
/// assert!(report.sequence_error.is_none());
///
/// engine.close_session(session)?;
/// # Ok::<(), tilawa_core::TilawaError>(())
/// ```
pub struct RecitationEngine {
    config: Arc<AlignmentConfig>,
    quran: Arc<QuranText>,
    pages: RwLock<HashMap<u16, Arc<PageContext>>>,
    sessions: SessionStore,
    tracker: PositionTracker,
    analyzer: SequenceAnalyzer,
    transcriber: Option<TranscriberHandle>,
    event_tx: broadcast::Sender<RecitationEvent>,
    diagnostics: Arc<EngineDiagnostics>,
}

impl RecitationEngine {
    /// # Errors
    /// `TilawaError::InvalidConfig` if `config` fails validation.
    pub fn new(config: AlignmentConfig, quran: Arc<QuranText>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(BROADCAST_CAP);
        info!(
            words = quran.word_count(),
            aggregation = ?config.confidence_aggregation,
            "recitation engine ready"
        );
        Ok(Self {
            tracker: PositionTracker::new(&config),
            analyzer: SequenceAnalyzer::new(&config),
            config: Arc::new(config),
            quran,
            pages: RwLock::new(HashMap::new()),
            sessions: SessionStore::new(),
            transcriber: None,
            event_tx,
            diagnostics: Arc::new(EngineDiagnostics::default()),
        })
    }

    /// Attach the backend used by `process_audio`.
    pub fn with_transcriber(mut self, transcriber: TranscriberHandle) -> Self {
        info!(backend = %transcriber.name(), "transcriber attached");
        self.transcriber = Some(transcriber);
        self
    }

    /// Validated configuration shared by every session.
    pub fn config(&self) -> &AlignmentConfig {
        &self.config
    }

    /// The canonical text pages are cut from.
    pub fn quran(&self) -> &QuranText {
        &self.quran
    }

    /// Shared context for `page_no`, built on first use.
    pub fn page_context(&self, page_no: u16) -> Result<Arc<PageContext>> {
        if let Some(ctx) = self.pages.read().get(&page_no) {
            return Ok(Arc::clone(ctx));
        }
        let built = Arc::new(PageContext::build(self.quran.page(page_no)?, &self.config));
        let mut pages = self.pages.write();
        let ctx = pages.entry(page_no).or_insert(built);
        Ok(Arc::clone(ctx))
    }

    /// Start a session on `page_no`, positioned at the page's first word in
    /// tracking mode.
    ///
    /// # Errors
    /// `TilawaError::PageNotFound` if the page is not in the canonical text.
    pub fn open_session(&self, page_no: u16) -> Result<SessionId> {
        let ctx = self.page_context(page_no)?;
        Ok(self.sessions.create(ctx).id())
    }

    /// End a session and discard its state. Fragments still queued for it
    /// are never committed; pushing more fails with `SessionClosed`.
    pub fn close_session(&self, id: SessionId) -> Result<()> {
        self.sessions.destroy(id)
    }

    /// Number of sessions held by the store, closed ones excluded.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Move a session to another page and restart at its first word.
    ///
    /// Bumps the session revision, so queued evaluations made against the
    /// old page are dropped instead of committed.
    pub fn change_page(&self, id: SessionId, page_no: u16) -> Result<SessionState> {
        let session = self.open(id)?;
        let ctx = self.page_context(page_no)?;
        let mut slot = session.lock();
        slot.state.reset_to_page(&ctx.page);
        slot.page = ctx;
        info!(session = %id, page = page_no, "session moved to page");
        Ok(slot.state.clone())
    }

    /// Copy of the session's current state.
    pub fn session_snapshot(&self, id: SessionId) -> Result<SessionState> {
        Ok(self.open(id)?.lock().state.clone())
    }

    /// Process one transcript fragment to completion. Concurrent calls for
    /// the same session are serialised on the session lock and numbered in
    /// the order they commit.
    ///
    /// # Errors
    /// `SessionNotFound` or `SessionClosed`. Fragments that match nothing are
    /// not errors; they come back as a report with the matching
    /// `FragmentOutcome`.
    pub fn process_fragment(&self, id: SessionId, raw: &str) -> Result<FragmentReport> {
        let session = self.open(id)?;
        self.diagnostics.fragments_in.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let fragment = TranscriptFragment::new(raw);

        // seq is taken under the lock so commit order matches seq order.
        let mut guard = session.lock();
        let seq = session.next_seq();
        let span = info_span!("fragment", session = %id, seq);
        let _enter = span.enter();
        let slot = &mut *guard;
        let evaluation = pipeline::evaluate(
            &self.tracker,
            &self.analyzer,
            &slot.state,
            &slot.page,
            &fragment,
        );
        let report = self.commit(id, &mut slot.state, evaluation, seq);
        drop(guard);

        self.diagnostics.record_elapsed(started.elapsed());
        Ok(report)
    }

    /// Transcribe `audio` with the attached backend, then process the text.
    ///
    /// # Errors
    /// `TilawaError::Transcription` when no backend is attached or the
    /// backend fails; the session is untouched in both cases.
    pub fn process_audio(&self, id: SessionId, audio: &[u8]) -> Result<FragmentReport> {
        let transcriber = self
            .transcriber
            .as_ref()
            .ok_or_else(|| TilawaError::Transcription("no transcriber configured".into()))?;
        let text = transcriber.transcribe(audio).map_err(|e| {
            error!(session = %id, "transcription failed: {e}");
            e
        })?;
        self.process_fragment(id, &text)
    }

    /// Start the asynchronous FIFO queue for a session.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_queue(self: &Arc<Self>, id: SessionId) -> Result<FragmentQueue> {
        let session = self.open(id)?;
        Ok(pipeline::spawn(Arc::clone(self), session))
    }

    /// Receive every `RecitationEvent` from now on, for all sessions.
    ///
    /// Slow receivers lag rather than block the engine; see
    /// `broadcast::error::RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<RecitationEvent> {
        self.event_tx.subscribe()
    }

    /// Counters since the engine started.
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn open(&self, id: SessionId) -> Result<Arc<Session>> {
        let session = self.sessions.get(id)?;
        if session.is_closed() {
            return Err(TilawaError::SessionClosed(id));
        }
        Ok(session)
    }

    /// Stage 4–5: commit under the caller's session lock and broadcast.
    fn commit(
        &self,
        id: SessionId,
        state: &mut SessionState,
        evaluation: Evaluation,
        seq: u64,
    ) -> FragmentReport {
        let Evaluation {
            outcome,
            sequence_error,
        } = evaluation;

        let prev_anchor = state.anchor_global_index;
        let entered_search = state.commit(&outcome, sequence_error.as_ref(), &self.config);

        self.diagnostics.record_outcome(outcome.outcome);
        if entered_search {
            self.diagnostics
                .search_mode_entries
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                low_confidence = state.consecutive_low_confidence_count,
                "sustained low confidence, searching whole page"
            );
        }
        if let Some(alert) = &sequence_error {
            self.diagnostics
                .alerts_emitted
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                kind = ?alert.error_type,
                severity = ?alert.severity,
                confidence = alert.confidence,
                prev_anchor,
                "sequence anomaly"
            );
        }

        let report = FragmentReport {
            seq,
            session_id: id,
            outcome: outcome.outcome,
            matches: outcome.matches,
            sequence_error,
            confidence: outcome.confidence,
            segment_score: outcome.segment_score,
            mode: state.mode,
            anchor: state.anchor_global_index,
            consecutive_low_confidence: state.consecutive_low_confidence_count,
        };
        let _ = self.event_tx.send(RecitationEvent::Report(report.clone()));
        report
    }

    async fn process_queued(self: &Arc<Self>, session: &Arc<Session>, item: pipeline::QueuedFragment) {
        let id = session.id();
        self.diagnostics.fragments_in.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let (state, page) = session.snapshot();
        let revision = state.revision;
        let engine = Arc::clone(self);
        let work = tokio::task::spawn_blocking(move || {
            let fragment = TranscriptFragment::new(item.text);
            pipeline::evaluate(&engine.tracker, &engine.analyzer, &state, &page, &fragment)
        });

        let evaluation = match tokio::time::timeout(self.config.fragment_deadline(), work).await {
            Ok(Ok(evaluation)) => evaluation,
            Ok(Err(e)) => {
                error!(session = %id, "fragment evaluation task failed: {e}");
                self.drop_fragment(id, item.seq, "evaluation failed");
                return;
            }
            Err(_) => {
                self.drop_fragment(id, item.seq, "deadline exceeded");
                return;
            }
        };

        if self
            .commit_queued(session, revision, evaluation, item.seq)
            .is_some()
        {
            self.diagnostics.record_elapsed(started.elapsed());
        }
    }

    /// Commit an evaluation made against the snapshot at `revision`. If the
    /// session moved on meanwhile the result is stale: it is dropped and the
    /// state is left as it is.
    fn commit_queued(
        &self,
        session: &Session,
        revision: u64,
        evaluation: Evaluation,
        seq: u64,
    ) -> Option<FragmentReport> {
        let id = session.id();
        let mut guard = session.lock();
        if session.is_closed() {
            return None;
        }
        if guard.state.revision != revision {
            drop(guard);
            self.drop_fragment(id, seq, "session state changed during evaluation");
            return None;
        }
        Some(self.commit(id, &mut guard.state, evaluation, seq))
    }

    fn drop_fragment(&self, id: SessionId, seq: u64, reason: &str) {
        self.diagnostics.dropped.fetch_add(1, Ordering::Relaxed);
        warn!(session = %id, seq, reason, "fragment dropped");
        let _ = self.event_tx.send(RecitationEvent::Dropped {
            session_id: id,
            seq,
            reason: reason.to_string(),
        });
    }
}

impl std::fmt::Debug for RecitationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecitationEngine")
            .field("sessions", &self.sessions.len())
            .field("pages_cached", &self.pages.read().len())
            .finish_non_exhaustive()
    }
}
