//! Transcription backend abstraction.
//!
//! The `Transcriber` trait decouples the engine from whichever service turns
//! a recorded fragment into text (a cloud Whisper endpoint, a local model, or
//! the passthrough used for text replay). The alignment core never sees
//! which one is in use.
//!
//! `&mut self` on `transcribe` lets backends keep connection pools or decoder
//! state; all calls are serialised through `TranscriberHandle`'s
//! `parking_lot::Mutex`.

pub mod stub;

pub use stub::PassthroughTranscriber;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

/// Contract for speech-to-text backends.
pub trait Transcriber: Send + 'static {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Transcribe one encoded audio fragment (WAV, WebM, ...).
    ///
    /// # Errors
    /// `TilawaError::Transcription` if the backend rejects the audio or is
    /// unreachable.
    fn transcribe(&mut self, audio: &[u8]) -> Result<String>;
}

/// Thread-safe reference-counted handle to any `Transcriber` implementor.
#[derive(Clone)]
pub struct TranscriberHandle(pub Arc<Mutex<dyn Transcriber>>);

impl TranscriberHandle {
    pub fn new<T: Transcriber>(transcriber: T) -> Self {
        Self(Arc::new(Mutex::new(transcriber)))
    }

    pub fn name(&self) -> String {
        self.0.lock().name().to_string()
    }

    pub fn transcribe(&self, audio: &[u8]) -> Result<String> {
        self.0.lock().transcribe(audio)
    }
}

impl std::fmt::Debug for TranscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriberHandle").finish_non_exhaustive()
    }
}
