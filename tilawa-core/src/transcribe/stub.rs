//! `PassthroughTranscriber`: treats the fragment bytes as UTF-8 transcript
//! text. Lets transcript replays and tests run through the same
//! `process_audio` path as real audio.

use tracing::debug;

use crate::error::{Result, TilawaError};
use crate::transcribe::Transcriber;

#[derive(Debug, Default)]
pub struct PassthroughTranscriber {
    calls: u64,
}

impl PassthroughTranscriber {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transcriber for PassthroughTranscriber {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn transcribe(&mut self, audio: &[u8]) -> Result<String> {
        self.calls += 1;
        let text = std::str::from_utf8(audio)
            .map_err(|e| TilawaError::Transcription(format!("fragment is not UTF-8 text: {e}")))?;
        debug!(call = self.calls, bytes = audio.len(), "passthrough transcription");
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::TranscriberHandle;

    #[test]
    fn returns_trimmed_text() {
        let handle = TranscriberHandle::new(PassthroughTranscriber::new());
        assert_eq!(handle.name(), "passthrough");
        let text = handle
            .transcribe(" بسم الله \n".as_bytes())
            .expect("valid utf-8");
        assert_eq!(text, "بسم الله");
    }

    #[test]
    fn rejects_binary_audio() {
        let mut t = PassthroughTranscriber::new();
        assert!(matches!(
            t.transcribe(&[0xff, 0xfe, 0x00]),
            Err(TilawaError::Transcription(_))
        ));
    }
}
