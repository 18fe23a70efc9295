//! Tilawa command-line host.
//!
//! ```text
//! tilawa replay --page 1 transcript.txt   # one fragment per line
//! tilawa audio  --page 1 a.wav b.wav      # transcribe, then track
//! tilawa audio  --cumulative a.wav b.wav  # transcribe a sliding window
//! tilawa metadata
//! tilawa search "الرحمن" --limit 5
//! ```
//!
//! Every processed fragment is printed to stdout as one JSON line; logs go
//! to stderr and are filtered with `RUST_LOG` (default `tilawa=info`).

mod audio;
mod settings;
mod whisper;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use audio::AudioWindow;
use clap::{Parser, Subcommand};
use settings::{default_settings_path, load_settings, AppSettings, TranscriberBackend};
use tilawa_core::{
    PassthroughTranscriber, QuranText, RecitationEngine, RecitationEvent, TranscriberHandle,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use whisper::WhisperHttpTranscriber;

#[derive(Debug, Parser)]
#[command(name = "tilawa", version, about = "Follow a Quran recitation through the canonical text")]
struct Cli {
    /// Settings file (defaults to the per-user config directory).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Canonical text JSON; overrides `quranDataPath`.
    #[arg(long, global = true)]
    quran: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Feed a transcript file through the session queue, one fragment per line.
    Replay {
        #[arg(long)]
        page: Option<u16>,
        file: PathBuf,
    },
    /// Transcribe WAV fragments in order and track each one.
    Audio {
        #[arg(long)]
        page: Option<u16>,
        /// Transcribe the latest `audioBufferMaxSecs` of audio on every
        /// fragment instead of the fragment alone.
        #[arg(long)]
        cumulative: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print page, sura and juz counts of the canonical text.
    Metadata,
    /// Find ayat containing a phrase.
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tilawa=info")),
        )
        .init();

    let cli = Cli::parse();
    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path);
    info!(path = %settings_path.display(), "settings loaded");

    let quran_path = cli
        .quran
        .clone()
        .or_else(|| settings.quran_data_path.clone())
        .context("no canonical text configured: pass --quran or set quranDataPath")?;
    let quran = Arc::new(
        QuranText::load(&quran_path)
            .with_context(|| format!("loading canonical text from {}", quran_path.display()))?,
    );

    match cli.command {
        Command::Replay { page, file } => {
            let page = page.unwrap_or(settings.default_page);
            replay(&settings, quran, page, &file).await
        }
        Command::Audio {
            page,
            cumulative,
            files,
        } => {
            let page = page.unwrap_or(settings.default_page);
            // The HTTP transcriber blocks; keep it off the async workers.
            tokio::task::spawn_blocking(move || run_audio(&settings, quran, page, cumulative, &files))
                .await
                .context("audio worker panicked")?
        }
        Command::Metadata => print_json(&quran.metadata()),
        Command::Search { query, limit } => print_json(&quran.search(&query, limit)),
    }
}

fn build_engine(settings: &AppSettings, quran: Arc<QuranText>) -> Result<RecitationEngine> {
    let config = settings.alignment.clone().with_env_overrides();
    RecitationEngine::new(config, quran).context("engine configuration rejected")
}

async fn replay(settings: &AppSettings, quran: Arc<QuranText>, page: u16, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading transcript {}", file.display()))?;
    let fragments: Vec<&str> = raw.lines().filter(|l| !l.trim().is_empty()).collect();

    let engine = Arc::new(build_engine(settings, quran)?);
    let session = engine.open_session(page)?;
    let mut events = engine.subscribe();
    let queue = engine.spawn_queue(session)?;
    info!(%session, page, fragments = fragments.len(), "replaying transcript");

    let mut last_seq = 0;
    for fragment in fragments {
        last_seq = queue.push(fragment)?;
    }

    while last_seq > 0 {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "output fell behind the engine; events lost");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let seq = match event {
            RecitationEvent::Report(report) => {
                print_json(&report)?;
                report.seq
            }
            RecitationEvent::Dropped { seq, reason, .. } => {
                warn!(seq, %reason, "fragment dropped");
                seq
            }
        };
        if seq >= last_seq {
            break;
        }
    }

    engine.close_session(session)?;
    info!(diagnostics = ?engine.diagnostics(), "replay finished");
    Ok(())
}

fn run_audio(
    settings: &AppSettings,
    quran: Arc<QuranText>,
    page: u16,
    cumulative: bool,
    files: &[PathBuf],
) -> Result<()> {
    let transcriber = match settings.transcriber {
        TranscriberBackend::Whisper => {
            let Some(api_key) = settings.resolve_api_key() else {
                bail!("whisper backend needs apiKey in settings or GROQ_API_KEY");
            };
            TranscriberHandle::new(WhisperHttpTranscriber::new(
                settings.transcription_endpoint.clone(),
                settings.transcription_model.clone(),
                settings.language.clone(),
                api_key,
            )?)
        }
        TranscriberBackend::Passthrough => TranscriberHandle::new(PassthroughTranscriber::new()),
    };
    info!(backend = %transcriber.name(), "transcriber ready");

    let engine = build_engine(settings, quran)?.with_transcriber(transcriber);
    let session = engine.open_session(page)?;

    let is_audio = settings.transcriber == TranscriberBackend::Whisper;
    if cumulative && !is_audio {
        warn!("--cumulative needs an audio backend; sending fragments one by one");
    }
    let mut window = (cumulative && is_audio).then(|| AudioWindow::new(settings.audio_buffer_max_secs));

    for file in files {
        let mut bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
        if is_audio {
            let decoded =
                audio::decode_wav(&bytes).with_context(|| format!("decoding {}", file.display()))?;
            let rms = audio::compute_rms(&decoded.samples);
            if rms < settings.min_audio_energy {
                info!(file = %file.display(), rms, "fragment below energy gate; skipped");
                continue;
            }
            if let Some(window) = window.as_mut() {
                window
                    .push(decoded)
                    .with_context(|| format!("buffering {}", file.display()))?;
                debug!(secs = window.duration_secs(), "transcribing audio window");
                bytes = window.to_wav()?;
            }
        }
        match engine.process_audio(session, &bytes) {
            Ok(report) => print_json(&report)?,
            // A failed fragment is logged and the session carries on.
            Err(e) => warn!(file = %file.display(), error = %e, "fragment failed"),
        }
    }

    engine.close_session(session)?;
    info!(diagnostics = ?engine.diagnostics(), "audio run finished");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "{line}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_replay_with_global_flags() {
        let cli = Cli::parse_from([
            "tilawa", "replay", "--page", "3", "t.txt", "--quran", "q.json",
        ]);
        assert_eq!(cli.quran, Some(PathBuf::from("q.json")));
        match cli.command {
            Command::Replay { page, file } => {
                assert_eq!(page, Some(3));
                assert_eq!(file, PathBuf::from("t.txt"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn audio_requires_at_least_one_file() {
        assert!(Cli::try_parse_from(["tilawa", "audio"]).is_err());
    }

    #[test]
    fn audio_cumulative_flag() {
        let cli = Cli::parse_from(["tilawa", "audio", "--cumulative", "a.wav", "b.wav"]);
        match cli.command {
            Command::Audio {
                cumulative, files, ..
            } => {
                assert!(cumulative);
                assert_eq!(files.len(), 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn search_limit_defaults_to_ten() {
        let cli = Cli::parse_from(["tilawa", "search", "الرحمن"]);
        match cli.command {
            Command::Search { limit, .. } => assert_eq!(limit, 10),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
