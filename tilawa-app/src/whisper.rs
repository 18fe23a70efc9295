//! Whisper transcription over an OpenAI-compatible HTTP endpoint.
//!
//! Uses the blocking client; call it from a blocking thread, never from
//! inside an async task.

use std::time::Duration;

use reqwest::blocking::{multipart, Client};
use tilawa_core::{Result, TilawaError, Transcriber};
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub struct WhisperHttpTranscriber {
    client: Client,
    endpoint: String,
    model: String,
    language: String,
    api_key: String,
}

impl WhisperHttpTranscriber {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        language: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TilawaError::Transcription(format!("client build failed: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            language: language.into(),
            api_key: api_key.into(),
        })
    }
}

impl Transcriber for WhisperHttpTranscriber {
    fn name(&self) -> &str {
        &self.model
    }

    fn transcribe(&mut self, audio: &[u8]) -> Result<String> {
        let file_part = multipart::Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| TilawaError::Transcription(format!("multipart file part: {e}")))?;
        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .text("response_format", "json")
            .part("file", file_part);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| TilawaError::Transcription(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "transcription request returned non-success status");
            return Err(TilawaError::Transcription(format!("endpoint returned {status}")));
        }

        let payload: serde_json::Value = response
            .json()
            .map_err(|e| TilawaError::Transcription(format!("json parse failed: {e}")))?;
        let text = payload
            .get("text")
            .and_then(|t| t.as_str())
            .ok_or_else(|| TilawaError::Transcription("response has no text field".into()))?
            .trim()
            .to_string();
        debug!(chars = text.chars().count(), "transcribed fragment");
        Ok(text)
    }
}
