//! The per-episode cleanup pipeline.
//!
//! Stages run in a fixed order over one exclusively-borrowed word list:
//! command extraction, flubber policy, filler detection, audio rebuild, SFX
//! overlay, command execution, and finally guarded pause compression. Long
//! recordings go through the chunk orchestrator instead, falling back to
//! direct processing if chunked mode cannot complete.

use std::collections::HashMap;
use std::fmt::Write as FmtWrite;

use tracing::{info, warn};

use crate::audio::AudioClip;
use crate::chunking::{self, process_chunked};
use crate::commands::extract_commands;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::fillers::{blank_fillers, compute_filler_spans};
use crate::flubber::{apply_rollback, detect_flubber, FlubberOutcome};
use crate::intern::{apply_command_events, apply_sfx_events};
use crate::pauses::{compress_pauses, PauseCompressionResult};
use crate::providers::{AnswerProvider, AudioStore, ChunkQueue, SfxStore, TtsProvider};
use crate::rebuild::rebuild_audio;
use crate::transcript::Transcript;

#[derive(Debug)]
pub struct EpisodeResult {
    pub audio: AudioClip,
    /// Final transcript with fillers, rollback spans, and consumed command
    /// scaffolding blanked.
    pub transcript: Transcript,
    pub shownotes: Vec<String>,
    pub filler_counts: HashMap<String, u32>,
    pub fillers_removed: u32,
    pub sfx_applied: u32,
    pub commands_inserted: u32,
    pub rollback_span: Option<(usize, usize)>,
    /// Absent when the episode was assembled from chunks (each chunk did its
    /// own compression pass).
    pub pause_result: Option<PauseCompressionResult>,
    pub original_duration_s: f64,
    pub final_duration_s: f64,
}

/// Run the direct (non-chunked) pipeline over one recording.
pub async fn process_episode(
    source: AudioClip,
    transcript: Transcript,
    config: &PipelineConfig,
    answer: &AnswerProvider,
    tts: &TtsProvider,
    sfx_store: &SfxStore,
) -> Result<EpisodeResult, PipelineError> {
    run_cleanup(source, transcript, config, answer, tts, sfx_store, true).await
}

/// Top-level entry: picks chunked mode for long recordings and falls back to
/// direct processing when chunked mode aborts.
#[allow(clippy::too_many_arguments)]
pub async fn process_recording(
    source: AudioClip,
    transcript: Transcript,
    config: &PipelineConfig,
    answer: &AnswerProvider,
    tts: &TtsProvider,
    sfx_store: &SfxStore,
    store: &AudioStore,
    queue: &ChunkQueue,
    episode_id: &str,
    requester_id: &str,
) -> Result<EpisodeResult, PipelineError> {
    if chunking::should_chunk(source.duration_s(), config) {
        match process_chunked(&source, &transcript, config, store, queue, episode_id, requester_id)
            .await
        {
            Ok(audio) => {
                let original_duration_s = source.duration_s();
                let final_duration_s = audio.duration_s();
                return Ok(EpisodeResult {
                    audio,
                    transcript,
                    shownotes: Vec::new(),
                    filler_counts: HashMap::new(),
                    fillers_removed: 0,
                    sfx_applied: 0,
                    commands_inserted: 0,
                    rollback_span: None,
                    pause_result: None,
                    original_duration_s,
                    final_duration_s,
                });
            }
            Err(e @ PipelineError::Aborted { .. }) => return Err(e),
            Err(e) => {
                warn!("chunked processing failed ({}), falling back to direct", e);
            }
        }
    }

    process_episode(source, transcript, config, answer, tts, sfx_store).await
}

/// The shared stage sequence. `trim_trailing` is set for direct runs and for
/// the last chunk of a chunked run: trailing silence after the final word is
/// cut, keeping a short pad.
pub(crate) async fn run_cleanup(
    source: AudioClip,
    mut transcript: Transcript,
    config: &PipelineConfig,
    answer: &AnswerProvider,
    tts: &TtsProvider,
    sfx_store: &SfxStore,
    trim_trailing: bool,
) -> Result<EpisodeResult, PipelineError> {
    let original_duration_s = source.duration_s();

    let extraction = extract_commands(&mut transcript.words, config);
    info!(
        "extracted {} commands, {} sfx events",
        extraction.commands.len(),
        extraction.sfx.len()
    );

    let rollback_span = match detect_flubber(&transcript.words, config) {
        Some(FlubberOutcome::Abort { reason }) => {
            return Err(PipelineError::Aborted { reason });
        }
        Some(FlubberOutcome::Rollback { blank_from_index, blank_to_index_inclusive }) => {
            Some((blank_from_index, blank_to_index_inclusive))
        }
        None => None,
    };

    // Filler spans are computed on the raw text, before rollback blanking,
    // so a filler inside a rollback span still has its audio removed.
    let filler_spans = compute_filler_spans(&transcript.words, &config.filler_phrases);

    let rebuild = rebuild_audio(&source, &transcript.words, &filler_spans, config.lead_trim_ms);

    if let Some((from, to)) = rollback_span {
        apply_rollback(&mut transcript.words, from, to);
    }
    blank_fillers(&mut transcript.words, &filler_spans);

    let mut track = rebuild.audio;
    let sfx_applied = apply_sfx_events(&mut track, &extraction.sfx, sfx_store, config);

    let (mut track, command_outcome) = apply_command_events(
        track,
        &extraction.commands,
        original_duration_s,
        answer,
        tts,
        config,
    )
    .await;

    if trim_trailing && !transcript.is_empty() {
        let tail_s = (original_duration_s - transcript.last_word_end()).max(0.0);
        let pad_s = config.chunk_tail_pad_ms as f64 / 1000.0;
        let cutoff = track.duration_s() - tail_s + pad_s;
        if cutoff > 0.0 && cutoff < track.duration_s() {
            info!("trimming {:.1}s of trailing silence", track.duration_s() - cutoff);
            track = track.slice_s(0.0, cutoff);
        }
    }

    let (track, pause_result) = compress_pauses(&track, config);

    let final_duration_s = track.duration_s();
    info!(
        "cleanup complete: {:.1}s -> {:.1}s ({} fillers, {} sfx, {} inserts)",
        original_duration_s,
        final_duration_s,
        rebuild.fillers_removed,
        sfx_applied,
        command_outcome.inserted
    );

    Ok(EpisodeResult {
        audio: track,
        transcript,
        shownotes: command_outcome.shownotes,
        filler_counts: rebuild.filler_counts,
        fillers_removed: rebuild.fillers_removed,
        sfx_applied,
        commands_inserted: command_outcome.inserted,
        rollback_span,
        pause_result: Some(pause_result),
        original_duration_s,
        final_duration_s,
    })
}

/// Human-readable summary written next to the output by the debug binary.
pub fn render_report(result: &EpisodeResult) -> String {
    let mut report = String::new();
    writeln!(report, "=== Podtrim Report ===").ok();
    writeln!(
        report,
        "Duration: {:.1}s -> {:.1}s ({:.1}s saved)",
        result.original_duration_s,
        result.final_duration_s,
        result.original_duration_s - result.final_duration_s
    )
    .ok();
    writeln!(report).ok();

    writeln!(report, "Fillers removed: {}", result.fillers_removed).ok();
    let mut counts: Vec<(&String, &u32)> = result.filler_counts.iter().collect();
    counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (phrase, count) in counts {
        writeln!(report, "  \"{}\": {}", phrase, count).ok();
    }

    writeln!(report, "SFX overlaid: {}", result.sfx_applied).ok();
    writeln!(report, "Answers inserted: {}", result.commands_inserted).ok();

    if let Some((from, to)) = result.rollback_span {
        writeln!(report, "Flubber rollback: words {}..={} blanked", from, to).ok();
    }

    match &result.pause_result {
        Some(p) if p.rolled_back => {
            writeln!(
                report,
                "Pause compression: rolled back ({:.1}% removal, {:.3} similarity)",
                p.removal_pct * 100.0,
                p.envelope_similarity
            )
            .ok();
        }
        Some(p) => {
            writeln!(
                report,
                "Pause compression: {} pauses, {:.1}s removed",
                p.compressed_count,
                p.removed_ms as f64 / 1000.0
            )
            .ok();
        }
        None => {
            writeln!(report, "Pause compression: per-chunk").ok();
        }
    }

    if !result.shownotes.is_empty() {
        writeln!(report).ok();
        writeln!(report, "Show notes:").ok();
        for note in &result.shownotes {
            writeln!(report, "  - {}", note).ok();
        }
    }

    report
}
