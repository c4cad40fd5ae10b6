use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What an intern-command alias asks for. `Generic` defers the spoken-insert
/// vs show-note decision to classification; `Shownote` forces text-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InternMode {
    Generic,
    Shownote,
}

/// Per-job configuration for the whole cleanup pipeline. Built once and
/// passed by reference into each stage; there is no process-wide state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Filler words/phrases removed from both audio and transcript.
    pub filler_phrases: Vec<String>,
    /// Spoken SFX trigger phrase -> sound-effect file name.
    pub sfx_aliases: HashMap<String, String>,
    /// Spoken command token -> intern mode.
    pub intern_aliases: HashMap<String, InternMode>,
    /// Phrases that close an intern command's context window ("stop intern").
    pub end_marker_phrases: Vec<String>,
    /// Keep the trigger token in the transcript (legacy default: keep).
    pub keep_command_token: bool,
    /// Silence the spoken prompt window in the cleaned track before inserting
    /// the answer.
    pub remove_spoken_prompt: bool,
    /// Upper bound on context words scanned for an end marker.
    pub max_context_words: usize,
    /// Inter-word gap that closes the context window.
    pub context_gap_s: f64,
    /// Absolute cap on the context window.
    pub context_window_s: f64,

    pub flubber_fuzzy: bool,
    /// Edit-distance similarity ratio for fuzzy flubber matching.
    pub flubber_similarity: f64,
    pub flubber_lookback_words: usize,
    /// Two flubbers closer than this abort the whole job.
    pub flubber_abort_window_s: f64,

    /// Trim applied to the tail of the previously kept segment when a filler
    /// is removed, to drop the in-breath before it.
    pub lead_trim_ms: u64,

    /// Silence regions at least this long are compressed.
    pub max_pause_s: f64,
    /// Compressed region length = max(min_target_s, len * pause_ratio).
    pub pause_ratio: f64,
    pub pause_min_target_s: f64,
    /// Silence threshold relative to whole-track dBFS.
    pub pause_rel_db: f64,
    /// Discard compression when it removes more than this share of the track.
    pub pause_removal_guard: f64,
    /// Discard compression when the energy envelope similarity drops below this.
    pub pause_similarity_guard: f64,

    /// Loudness target for SFX and synthesized answers.
    pub insert_target_dbfs: f64,
    /// Loudness-match gain clamp.
    pub insert_gain_clamp_db: f64,
    /// Clips quieter than this RMS floor are treated as already silent.
    pub insert_min_rms: f32,
    /// Pad added after the rescaled insertion point.
    pub insert_pad_ms: u64,
    pub answer_fade_out_ms: u64,
    /// Similarity threshold for prompt-echo stripping.
    pub echo_similarity: f64,
    /// Spoken fallback when answer generation fails.
    pub fallback_answer: String,

    /// Root directory for SFX assets.
    pub media_root: PathBuf,

    /// Recordings longer than this are processed in chunks.
    pub chunk_threshold_s: f64,
    pub chunk_duration_s: f64,
    pub chunk_retry_window_s: u64,
    pub chunk_retry_cap: u32,
    pub chunk_global_timeout_s: u64,
    pub chunk_poll_interval_s: u64,
    /// Pad kept after the last chunk's final word before trailing-silence trim.
    pub chunk_tail_pad_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut intern_aliases = HashMap::new();
        intern_aliases.insert("intern".to_string(), InternMode::Generic);
        intern_aliases.insert("shownote".to_string(), InternMode::Shownote);

        PipelineConfig {
            filler_phrases: vec![
                "um".to_string(),
                "uh".to_string(),
                "you know".to_string(),
            ],
            sfx_aliases: HashMap::new(),
            intern_aliases,
            end_marker_phrases: vec![
                "stop intern".to_string(),
                "thanks intern".to_string(),
                "thank you intern".to_string(),
            ],
            keep_command_token: true,
            remove_spoken_prompt: false,
            max_context_words: 48,
            context_gap_s: 2.5,
            context_window_s: 15.0,

            flubber_fuzzy: true,
            flubber_similarity: 0.8,
            flubber_lookback_words: 50,
            flubber_abort_window_s: 15.0,

            lead_trim_ms: 60,

            max_pause_s: 2.0,
            pause_ratio: 0.4,
            pause_min_target_s: 0.5,
            pause_rel_db: 16.0,
            pause_removal_guard: 0.10,
            pause_similarity_guard: 0.85,

            insert_target_dbfs: -20.0,
            insert_gain_clamp_db: 9.0,
            insert_min_rms: 1e-4,
            insert_pad_ms: 200,
            answer_fade_out_ms: 80,
            echo_similarity: 0.86,
            fallback_answer: "Sorry, I could not look that up right now.".to_string(),

            media_root: default_media_root(),

            chunk_threshold_s: 3600.0,
            chunk_duration_s: 1200.0,
            chunk_retry_window_s: 600,
            chunk_retry_cap: 3,
            chunk_global_timeout_s: 1800,
            chunk_poll_interval_s: 5,
            chunk_tail_pad_ms: 500,
        }
    }
}

impl PipelineConfig {
    /// Fuzzy flubber ratio with the documented clamp applied.
    pub fn flubber_similarity_clamped(&self) -> f64 {
        self.flubber_similarity.clamp(0.5, 0.95)
    }
}

fn default_media_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("podtrim")
        .join("media")
}
