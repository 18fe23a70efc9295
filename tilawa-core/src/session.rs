//! Session lifecycle: opaque ids and the store that owns per-session state.
//!
//! Each `Session` serialises its own fragments through one
//! `parking_lot::Mutex`; different sessions never share a lock, so they
//! process fully in parallel. The store's `RwLock` only guards the id map.

use std::collections::HashMap;
use std::fmt;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TilawaError};
use crate::tracking::{PageContext, SessionState};

/// Opaque session identifier, independent of any transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

/// Reading state plus the page it is tracked against.
#[derive(Debug)]
pub struct SessionSlot {
    pub state: SessionState,
    pub page: Arc<PageContext>,
}

/// One live recitation session.
///
/// Callers outside the crate read state through `snapshot`; only the engine
/// takes the lock and mutates it:
///
/// ```compile_fail
/// fn force_search(session: &tilawa_core::session::Session) {
///     session.lock().state.mode = tilawa_core::TrackingMode::Search;
/// }
/// ```
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    slot: Mutex<SessionSlot>,
    closed: AtomicBool,
    next_seq: AtomicU64,
}

impl Session {
    fn new(id: SessionId, page: Arc<PageContext>) -> Self {
        Self {
            id,
            slot: Mutex::new(SessionSlot {
                state: SessionState::new(&page.page),
                page,
            }),
            closed: AtomicBool::new(false),
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Exclusive access for evaluate + commit.
    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock()
    }

    /// Copy of the state and the shared page, for evaluation off the lock.
    pub fn snapshot(&self) -> (SessionState, Arc<PageContext>) {
        let slot = self.slot.lock();
        (slot.state.clone(), Arc::clone(&slot.page))
    }

    /// Sequence number for the next fragment, starting at 1.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Owns every live session, keyed by `SessionId`.
#[derive(Debug, Default)]
pub struct SessionStore {
    next_id: AtomicU64,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a session at the first word of `page`.
    pub fn create(&self, page: Arc<PageContext>) -> Arc<Session> {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let page_no = page.page.page_no();
        let session = Arc::new(Session::new(id, page));
        self.sessions.write().insert(id, Arc::clone(&session));
        info!(session = %id, page = page_no, "session created");
        session
    }

    pub fn get(&self, id: SessionId) -> Result<Arc<Session>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(TilawaError::SessionNotFound(id))
    }

    /// Remove a session and discard its state. In-flight work holding the
    /// `Arc` sees it as closed and stops committing.
    pub fn destroy(&self, id: SessionId) -> Result<()> {
        let session = self
            .sessions
            .write()
            .remove(&id)
            .ok_or(TilawaError::SessionNotFound(id))?;
        session.close();
        info!(session = %id, "session destroyed");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
