use thiserror::Error;

use crate::session::SessionId;

/// All errors produced by tilawa-core.
///
/// Per-fragment conditions (no confident segment, empty transcript,
/// suppressed sequence signals) are not errors; they are reported through
/// `FragmentOutcome` and never abort a session.
#[derive(Debug, Error)]
pub enum TilawaError {
    #[error("canonical data missing or inconsistent: {context}")]
    CanonicalDataMissing { context: String },

    #[error("page {0} not found in canonical data")]
    PageNotFound(u16),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("session {0} is closed")]
    SessionClosed(SessionId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TilawaError {
    pub(crate) fn canonical(context: impl Into<String>) -> Self {
        Self::CanonicalDataMissing {
            context: context.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TilawaError>;
