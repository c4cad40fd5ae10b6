//! In-memory mono audio buffer and the splicing/mixing primitives the
//! pipeline is built on. WAV in, WAV out; everything between is f32 samples.

use std::io::Cursor;

use anyhow::{bail, Context, Result};

/// Floor returned by `dbfs()` for silent buffers.
pub const SILENCE_DBFS: f32 = -120.0;

#[derive(Debug, Clone, Default)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        AudioClip { samples, sample_rate }
    }

    pub fn empty(sample_rate: u32) -> Self {
        AudioClip { samples: Vec::new(), sample_rate }
    }

    pub fn silence(duration_s: f64, sample_rate: u32) -> Self {
        let n = (duration_s.max(0.0) * sample_rate as f64).round() as usize;
        AudioClip { samples: vec![0.0; n], sample_rate }
    }

    /// Decode a WAV buffer into a mono clip. Multi-channel input is
    /// downmixed by averaging.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader =
            hound::WavReader::new(Cursor::new(bytes)).context("Failed to parse WAV data")?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            bail!("WAV data has no channels");
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .context("Failed to read float samples")?,
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max))
                    .collect::<std::result::Result<_, _>>()
                    .context("Failed to read integer samples")?
            }
        };

        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        Ok(AudioClip { samples, sample_rate: spec.sample_rate })
    }

    /// Encode as 16-bit PCM mono WAV.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .context("Failed to create WAV writer")?;
            for &s in &self.samples {
                let v = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer.write_sample(v).context("Failed to write sample")?;
            }
            writer.finalize().context("Failed to finalize WAV")?;
        }
        Ok(cursor.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn len_ms(&self) -> u64 {
        (self.samples.len() as u64 * 1000) / self.sample_rate as u64
    }

    fn index_at_s(&self, t: f64) -> usize {
        let idx = (t.max(0.0) * self.sample_rate as f64).round() as usize;
        idx.min(self.samples.len())
    }

    fn samples_for_ms(&self, ms: u64) -> usize {
        (ms as usize * self.sample_rate as usize) / 1000
    }

    /// Copy of the region `[start_s, end_s)`, clamped to the clip.
    pub fn slice_s(&self, start_s: f64, end_s: f64) -> AudioClip {
        let a = self.index_at_s(start_s);
        let b = self.index_at_s(end_s).max(a);
        AudioClip { samples: self.samples[a..b].to_vec(), sample_rate: self.sample_rate }
    }

    pub fn append(&mut self, other: &AudioClip) {
        debug_assert_eq!(self.sample_rate, other.sample_rate);
        self.samples.extend_from_slice(&other.samples);
    }

    pub fn truncate_tail_ms(&mut self, ms: u64) {
        let n = self.samples_for_ms(ms).min(self.samples.len());
        let new_len = self.samples.len() - n;
        self.samples.truncate(new_len);
    }

    /// Mix another clip on top starting at `at_s`. The overlay is clamped to
    /// this clip's bounds; anything running past the end is dropped.
    pub fn overlay_at_s(&mut self, other: &AudioClip, at_s: f64) {
        debug_assert_eq!(self.sample_rate, other.sample_rate);
        let start = self.index_at_s(at_s);
        for (k, &s) in other.samples.iter().enumerate() {
            match self.samples.get_mut(start + k) {
                Some(dst) => *dst = (*dst + s).clamp(-1.0, 1.0),
                None => break,
            }
        }
    }

    /// Splice another clip in at `at_s`, pushing the remainder later.
    pub fn insert_at_s(&mut self, other: &AudioClip, at_s: f64) {
        debug_assert_eq!(self.sample_rate, other.sample_rate);
        let at = self.index_at_s(at_s);
        self.samples.splice(at..at, other.samples.iter().copied());
    }

    /// Remove the region `[start_s, end_s)` entirely.
    pub fn cut_s(&mut self, start_s: f64, end_s: f64) {
        let a = self.index_at_s(start_s);
        let b = self.index_at_s(end_s).max(a);
        self.samples.drain(a..b);
    }

    /// Replace the region `[start_s, end_s)` with equal-duration silence.
    pub fn replace_with_silence_s(&mut self, start_s: f64, end_s: f64) {
        let a = self.index_at_s(start_s);
        let b = self.index_at_s(end_s).max(a);
        for s in &mut self.samples[a..b] {
            *s = 0.0;
        }
    }

    pub fn rms(&self) -> f32 {
        rms_of(&self.samples)
    }

    pub fn dbfs(&self) -> f32 {
        let rms = self.rms();
        if rms <= 0.0 {
            SILENCE_DBFS
        } else {
            20.0 * rms.log10()
        }
    }

    pub fn gain_db(&mut self, db: f32) {
        let ratio = 10.0f32.powf(db / 20.0);
        for s in &mut self.samples {
            *s = (*s * ratio).clamp(-1.0, 1.0);
        }
    }

    /// Push the clip toward a target dBFS with a clamped gain. Clips whose
    /// RMS is below `min_rms` are treated as already silent and left alone.
    pub fn loudness_match(&mut self, target_dbfs: f32, clamp_db: f32, min_rms: f32) {
        if self.rms() < min_rms {
            return;
        }
        let adjust = (target_dbfs - self.dbfs()).clamp(-clamp_db, clamp_db);
        if adjust.abs() >= 0.1 {
            self.gain_db(adjust);
        }
    }

    pub fn fade_out_ms(&mut self, ms: u64) {
        let n = self.samples_for_ms(ms).min(self.samples.len());
        if n == 0 {
            return;
        }
        let start = self.samples.len() - n;
        for k in 0..n {
            let factor = 1.0 - (k as f32 + 1.0) / n as f32;
            self.samples[start + k] *= factor;
        }
    }

    /// Per-frame RMS values over fixed-width windows.
    pub fn rms_envelope(&self, window_ms: u64) -> Vec<f32> {
        let win = self.samples_for_ms(window_ms).max(1);
        self.samples.chunks(win).map(rms_of).collect()
    }
}

fn rms_of(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Cosine similarity over the common prefix of two envelopes.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 1.0;
    }
    let mut dot = 0.0f64;
    let mut na = 0.0f64;
    let mut nb = 0.0f64;
    for k in 0..n {
        dot += a[k] as f64 * b[k] as f64;
        na += (a[k] as f64).powi(2);
        nb += (b[k] as f64).powi(2);
    }
    if na == 0.0 || nb == 0.0 {
        return if na == nb { 1.0 } else { 0.0 };
    }
    dot / (na.sqrt() * nb.sqrt())
}
