//! Application settings (JSON file, every field optional).
//!
//! ```json
//! {
//!   "quranDataPath": "data/quran.json",
//!   "defaultPage": 1,
//!   "transcriber": "whisper",
//!   "apiKey": null,
//!   "minAudioEnergy": 0.01,
//!   "audioBufferMaxSecs": 8.0,
//!   "alignment": { "TRACKING_WINDOW_SIZE": 60 }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tilawa_core::AlignmentConfig;
use tracing::warn;

pub const DEFAULT_TRANSCRIPTION_ENDPOINT: &str =
    "https://api.groq.com/openai/v1/audio/transcriptions";
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-large-v3-turbo";
pub const DEFAULT_LANGUAGE: &str = "ar";
pub const DEFAULT_MIN_AUDIO_ENERGY: f32 = 0.01;
pub const DEFAULT_AUDIO_BUFFER_MAX_SECS: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranscriberBackend {
    /// OpenAI-compatible `/audio/transcriptions` endpoint.
    #[default]
    Whisper,
    /// Fragment bytes are already transcript text.
    Passthrough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub quran_data_path: Option<PathBuf>,
    pub default_page: u16,
    pub transcriber: TranscriberBackend,
    pub transcription_endpoint: String,
    pub transcription_model: String,
    pub language: String,
    /// Falls back to `GROQ_API_KEY` when unset.
    pub api_key: Option<String>,
    /// WAV fragments whose RMS is below this are treated as silence.
    pub min_audio_energy: f32,
    /// Length of the sliding window transcribed in cumulative audio mode.
    pub audio_buffer_max_secs: f32,
    pub alignment: AlignmentConfig,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            quran_data_path: None,
            default_page: 1,
            transcriber: TranscriberBackend::Whisper,
            transcription_endpoint: DEFAULT_TRANSCRIPTION_ENDPOINT.into(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.into(),
            language: DEFAULT_LANGUAGE.into(),
            api_key: None,
            min_audio_energy: DEFAULT_MIN_AUDIO_ENERGY,
            audio_buffer_max_secs: DEFAULT_AUDIO_BUFFER_MAX_SECS,
            alignment: AlignmentConfig::default(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.default_page = self.default_page.max(1);
        self.transcription_endpoint = non_empty_or(&self.transcription_endpoint, DEFAULT_TRANSCRIPTION_ENDPOINT);
        self.transcription_model = non_empty_or(&self.transcription_model, DEFAULT_TRANSCRIPTION_MODEL);
        self.language = non_empty_or(&self.language, DEFAULT_LANGUAGE).to_ascii_lowercase();
        self.api_key = self
            .api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        self.min_audio_energy = if self.min_audio_energy.is_finite() {
            self.min_audio_energy.clamp(0.0, 1.0)
        } else {
            DEFAULT_MIN_AUDIO_ENERGY
        };
        self.audio_buffer_max_secs = if self.audio_buffer_max_secs.is_finite() {
            self.audio_buffer_max_secs.clamp(1.0, 60.0)
        } else {
            DEFAULT_AUDIO_BUFFER_MAX_SECS
        };
        self.quran_data_path = self
            .quran_data_path
            .take()
            .filter(|p| !p.as_os_str().is_empty());
    }

    /// Configured key, else `GROQ_API_KEY` from the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            std::env::var("GROQ_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
        })
    }
}

fn non_empty_or(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        fallback.into()
    } else {
        trimmed.into()
    }
}

/// Read settings from `path`; a missing or unreadable file yields defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "invalid settings file, using defaults");
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}

pub fn default_settings_path() -> PathBuf {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config")
        })
        .join("tilawa")
        .join("settings.json")
}
