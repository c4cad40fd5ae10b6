//! Guarded pause compression on the assembled track.
//!
//! Long low-energy regions are shortened, but the whole operation is
//! discarded if it removes too much of the track or bends the energy
//! envelope out of shape. Natural speech rhythm beats aggressive cutting.

use serde::Serialize;
use tracing::{debug, info};

use crate::audio::{cosine_similarity, AudioClip};
use crate::config::PipelineConfig;

/// RMS frame width used for silence-region detection.
const FRAME_MS: u64 = 50;
/// Envelope window width used for the similarity guard.
const ENVELOPE_MS: u64 = 500;

#[derive(Debug, Clone, Serialize)]
pub struct PauseCompressionResult {
    pub compressed_count: u32,
    pub removed_ms: u64,
    pub removal_pct: f64,
    pub envelope_similarity: f64,
    pub rolled_back: bool,
}

#[derive(Debug, Clone, Copy)]
struct Region {
    start_s: f64,
    end_s: f64,
}

/// Detect low-energy regions at least `max_pause_s` long, measured against a
/// per-track relative threshold (`track_dBFS − rel_db`).
fn detect_silence_regions(track: &AudioClip, config: &PipelineConfig) -> Vec<Region> {
    let threshold_dbfs = track.dbfs() - config.pause_rel_db as f32;
    let threshold_rms = 10.0f32.powf(threshold_dbfs / 20.0);
    let frames = track.rms_envelope(FRAME_MS);
    let frame_s = FRAME_MS as f64 / 1000.0;

    let mut regions = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, &rms) in frames.iter().enumerate() {
        if rms < threshold_rms {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            let len_s = (i - start) as f64 * frame_s;
            if len_s >= config.max_pause_s {
                regions.push(Region { start_s: start as f64 * frame_s, end_s: i as f64 * frame_s });
            }
        }
    }
    if let Some(start) = run_start {
        let len_s = (frames.len() - start) as f64 * frame_s;
        if len_s >= config.max_pause_s {
            regions.push(Region {
                start_s: start as f64 * frame_s,
                end_s: frames.len() as f64 * frame_s,
            });
        }
    }

    regions
}

/// Compress long pauses, keeping each region's leading edge. Returns the
/// resulting track and the guard accounting; when a guard trips, the
/// original track is returned unchanged.
pub fn compress_pauses(
    track: &AudioClip,
    config: &PipelineConfig,
) -> (AudioClip, PauseCompressionResult) {
    let regions = detect_silence_regions(track, config);

    let mut out = AudioClip::empty(track.sample_rate);
    let mut cursor = 0.0f64;
    let mut compressed_count = 0u32;

    for region in &regions {
        let len = region.end_s - region.start_s;
        let target = (len * config.pause_ratio).max(config.pause_min_target_s);
        if target >= len {
            continue;
        }
        out.append(&track.slice_s(cursor, region.start_s + target));
        cursor = region.end_s;
        compressed_count += 1;
        debug!(
            "pause {:.2}s-{:.2}s compressed {:.2}s -> {:.2}s",
            region.start_s, region.end_s, len, target
        );
    }
    out.append(&track.slice_s(cursor, track.duration_s()));

    let original_ms = track.len_ms();
    let removed_ms = original_ms.saturating_sub(out.len_ms());
    let removal_pct = if original_ms > 0 {
        removed_ms as f64 / original_ms as f64
    } else {
        0.0
    };
    let envelope_similarity = cosine_similarity(
        &track.rms_envelope(ENVELOPE_MS),
        &out.rms_envelope(ENVELOPE_MS),
    );

    let rolled_back = removal_pct > config.pause_removal_guard
        || envelope_similarity < config.pause_similarity_guard;

    let result = PauseCompressionResult {
        compressed_count,
        removed_ms,
        removal_pct,
        envelope_similarity,
        rolled_back,
    };

    if rolled_back {
        info!(
            "pause compression rolled back (removed {:.1}%, similarity {:.3})",
            removal_pct * 100.0,
            envelope_similarity
        );
        return (track.clone(), result);
    }

    (out, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 1000;

    /// Alternating-sign "speech" so windowed RMS stays high.
    fn speech(duration_s: f64) -> Vec<f32> {
        let n = (duration_s * SR as f64) as usize;
        (0..n).map(|i| if i % 2 == 0 { 0.4 } else { -0.4 }).collect()
    }

    fn track_with_pause(speech_before_s: f64, pause_s: f64, speech_after_s: f64) -> AudioClip {
        let mut samples = speech(speech_before_s);
        samples.extend(vec![0.0f32; (pause_s * SR as f64) as usize]);
        samples.extend(speech(speech_after_s));
        AudioClip::new(samples, SR)
    }

    fn cfg() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn five_second_pause_compresses_to_two_seconds() {
        let track = track_with_pause(50.0, 5.0, 45.0);
        let (out, result) = compress_pauses(&track, &cfg());
        assert!(!result.rolled_back);
        assert_eq!(result.compressed_count, 1);
        // max(0.5, 5.0 * 0.4) = 2.0 s kept, 3.0 s removed.
        assert_eq!(result.removed_ms, 3000);
        assert_eq!(out.len_ms(), track.len_ms() - 3000);
    }

    #[test]
    fn removal_guard_rolls_back_byte_for_byte() {
        // 3 s removed from a 10 s track is 30%, over the 10% guard.
        let track = track_with_pause(3.0, 5.0, 2.0);
        let (out, result) = compress_pauses(&track, &cfg());
        assert!(result.rolled_back);
        assert!(result.removal_pct > cfg().pause_removal_guard);
        assert_eq!(out.samples, track.samples);
    }

    #[test]
    fn short_pauses_are_left_alone() {
        let track = track_with_pause(10.0, 1.0, 10.0);
        let (out, result) = compress_pauses(&track, &cfg());
        assert_eq!(result.compressed_count, 0);
        assert_eq!(result.removed_ms, 0);
        assert_eq!(out.samples.len(), track.samples.len());
    }

    #[test]
    fn min_target_floors_the_compressed_length() {
        let mut config = cfg();
        config.max_pause_s = 1.0;
        config.pause_min_target_s = 0.9;
        let track = track_with_pause(30.0, 1.0, 30.0);
        let (_, result) = compress_pauses(&track, &config);
        // max(0.9, 1.0 * 0.4) = 0.9 kept, only 0.1 s removed.
        assert_eq!(result.compressed_count, 1);
        assert!(result.removed_ms <= 100);
    }

    #[test]
    fn fully_silent_track_is_untouched() {
        let track = AudioClip::silence(10.0, SR);
        let (out, result) = compress_pauses(&track, &cfg());
        assert_eq!(result.compressed_count, 0);
        assert_eq!(out.samples.len(), track.samples.len());
    }
}
