//! WAV fragment handling: energy gate and the cumulative sliding window.
//!
//! Fragments quieter than `minAudioEnergy` (RMS of the mono mix, samples
//! scaled to [-1, 1]) are skipped before they reach the transcriber. With
//! `--cumulative`, each fragment is appended to a window holding at most
//! `audioBufferMaxSecs` of the latest audio, and the whole window is
//! transcribed instead of the fragment alone.

use std::collections::VecDeque;
use std::io::Cursor;

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Mono samples in [-1, 1] at `sample_rate`.
#[derive(Debug, Clone)]
pub struct DecodedWav {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq = samples.iter().map(|s| s * s).sum::<f32>();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Decode a WAV buffer, mixing every channel down to mono.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedWav> {
    let reader = WavReader::new(Cursor::new(bytes)).context("not a WAV file")?;
    let spec = reader.spec();
    let interleaved = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("corrupt float WAV samples")?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("corrupt integer WAV samples")?
        }
    };
    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };
    Ok(DecodedWav {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// The most recent `max_secs` of audio, oldest samples dropped first.
#[derive(Debug)]
pub struct AudioWindow {
    max_secs: f32,
    sample_rate: Option<u32>,
    samples: VecDeque<f32>,
}

impl AudioWindow {
    pub fn new(max_secs: f32) -> Self {
        Self {
            max_secs,
            sample_rate: None,
            samples: VecDeque::new(),
        }
    }

    /// Append a fragment. Every fragment must share the first one's rate.
    pub fn push(&mut self, chunk: DecodedWav) -> Result<()> {
        let rate = *self.sample_rate.get_or_insert(chunk.sample_rate);
        if rate != chunk.sample_rate {
            bail!(
                "sample rate changed from {rate} Hz to {} Hz inside one window",
                chunk.sample_rate
            );
        }
        self.samples.extend(chunk.samples);
        let cap = (self.max_secs * rate as f32).round() as usize;
        if self.samples.len() > cap {
            let excess = self.samples.len() - cap;
            self.samples.drain(..excess);
        }
        Ok(())
    }

    pub fn duration_secs(&self) -> f32 {
        match self.sample_rate {
            Some(rate) if rate > 0 => self.samples.len() as f32 / rate as f32,
            _ => 0.0,
        }
    }

    /// The window as a 16-bit mono PCM WAV file.
    pub fn to_wav(&self) -> Result<Vec<u8>> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate.unwrap_or(16_000),
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).context("WAV header")?;
            for &s in &self.samples {
                writer
                    .write_sample((s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)
                    .context("WAV sample")?;
            }
            writer.finalize().context("WAV finalize")?;
        }
        Ok(cursor.into_inner())
    }
}
